//! The transport-independent channel contract.
//!
//! A [`Channel`] moves [`Message`]s between exactly two peers. Delivery is
//! best effort: no ordering, acknowledgment or exactly-once guarantees are
//! part of the contract. Callbacks are registered per event and the last
//! registration wins. Establishment never blocks; completion is observed
//! when [`Channel::poll`] invokes the connected handler.

use std::fmt;

use crate::network::messages::Message;

/// Handler invoked for every received message.
pub type MessageHandler = Box<dyn FnMut(Message) + Send>;

/// Handler invoked when the peer connects or disconnects.
pub type ConnectionHandler = Box<dyn FnMut() + Send>;

/// Opaque identifier a responder uses to find an initiator's room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomToken(String);

impl RoomToken {
    /// Wraps a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Failures reported by channel establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The transport cannot be used right now.
    Unavailable {
        /// Why the transport is unavailable.
        reason: String,
    },
    /// The token is not in a form this transport understands.
    InvalidRoomToken {
        /// The offending token.
        token: String,
    },
    /// No room is registered under the token.
    RoomNotFound {
        /// The token that was looked up.
        token: String,
    },
    /// The room already has its responder.
    RoomFull,
    /// The channel was already established.
    AlreadyEstablished,
    /// An I/O operation failed.
    Io {
        /// What was being attempted, with the OS error.
        context: String,
    },
    /// Establishment did not complete in time.
    Timeout,
    /// Every candidate of a fallback channel failed.
    Exhausted,
}

impl ChannelError {
    pub(crate) fn io(action: &str, err: &std::io::Error) -> Self {
        Self::Io {
            context: format!("{action}: {err}"),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Unavailable { reason } => {
                write!(f, "channel unavailable: {}", reason)
            },
            ChannelError::InvalidRoomToken { token } => {
                write!(f, "'{}' is not a valid room token", token)
            },
            ChannelError::RoomNotFound { token } => write!(f, "no room named '{}'", token),
            ChannelError::RoomFull => write!(f, "the room already has two players"),
            ChannelError::AlreadyEstablished => write!(f, "the channel is already established"),
            ChannelError::Io { context } => write!(f, "i/o failure while {}", context),
            ChannelError::Timeout => write!(f, "timed out waiting for the peer"),
            ChannelError::Exhausted => write!(f, "no transport could be established"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// A best-effort message transport between two peers.
///
/// # Contract
///
/// - `establish_as_initiator` opens a room and returns the token a responder
///   needs; `establish_as_responder` joins one.
/// - `send` returns whether the message was handed to the transport. It does
///   not imply delivery, and returns `false` before the channel connects.
/// - Handlers run from inside [`Channel::poll`] on the caller's thread.
/// - `poll` must be called regularly; it drives handshakes, timeouts and delivery.
pub trait Channel: Send {
    /// Opens a room and returns its token.
    ///
    /// # Errors
    /// Returns a [`ChannelError`] when the transport is unavailable.
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError>;

    /// Starts joining the room identified by `token`.
    ///
    /// # Errors
    /// Returns a [`ChannelError`] when the token is invalid or the room cannot be joined.
    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError>;

    /// Hands `message` to the transport.
    fn send(&mut self, message: &Message) -> bool;

    /// Registers the message handler, replacing any previous one.
    fn on_message(&mut self, handler: MessageHandler);

    /// Registers the connected handler, replacing any previous one.
    fn on_connected(&mut self, handler: ConnectionHandler);

    /// Registers the disconnected handler, replacing any previous one.
    fn on_disconnected(&mut self, handler: ConnectionHandler);

    /// Drives the transport and dispatches handlers.
    fn poll(&mut self);

    /// Returns true while a peer is connected.
    fn is_connected(&self) -> bool;

    /// Short transport label for logs.
    fn kind(&self) -> &'static str;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        (**self).establish_as_initiator()
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        (**self).establish_as_responder(token)
    }

    fn send(&mut self, message: &Message) -> bool {
        (**self).send(message)
    }

    fn on_message(&mut self, handler: MessageHandler) {
        (**self).on_message(handler);
    }

    fn on_connected(&mut self, handler: ConnectionHandler) {
        (**self).on_connected(handler);
    }

    fn on_disconnected(&mut self, handler: ConnectionHandler) {
        (**self).on_disconnected(handler);
    }

    fn poll(&mut self) {
        (**self).poll();
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

/// The three registered callbacks of a channel.
///
/// Shared by the adapters so that registration and dispatch behave the same everywhere.
#[derive(Default)]
pub(crate) struct Handlers {
    message: Option<MessageHandler>,
    connected: Option<ConnectionHandler>,
    disconnected: Option<ConnectionHandler>,
}

impl Handlers {
    pub(crate) fn set_message(&mut self, handler: MessageHandler) {
        self.message = Some(handler);
    }

    pub(crate) fn set_connected(&mut self, handler: ConnectionHandler) {
        self.connected = Some(handler);
    }

    pub(crate) fn set_disconnected(&mut self, handler: ConnectionHandler) {
        self.disconnected = Some(handler);
    }

    pub(crate) fn message(&mut self, message: Message) {
        if let Some(handler) = self.message.as_mut() {
            handler(message);
        }
    }

    pub(crate) fn connected(&mut self) {
        if let Some(handler) = self.connected.as_mut() {
            handler();
        }
    }

    pub(crate) fn disconnected(&mut self) {
        if let Some(handler) = self.disconnected.as_mut() {
            handler();
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            message,
            connected,
            disconnected,
        } = self;
        f.debug_struct("Handlers")
            .field("message", &message.is_some())
            .field("connected", &connected.is_some())
            .field("disconnected", &disconnected.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn last_registered_handler_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut handlers = Handlers::default();

        let counter = first.clone();
        handlers.set_connected(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = second.clone();
        handlers.set_connected(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        handlers.connected();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_without_handlers_is_a_no_op() {
        let mut handlers = Handlers::default();
        handlers.message(Message::Reset { game: 1 });
        handlers.disconnected();
        assert!(format!("{handlers:?}").contains("message: false"));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ChannelError::RoomNotFound {
                token: "ABC123".to_owned()
            }
            .to_string(),
            "no room named 'ABC123'"
        );
        assert_eq!(RoomToken::from("XY").to_string(), "XY");
    }
}
