//! Try several transports in order.
//!
//! A [`FallbackChannel`] holds an ordered list of candidate channels. The
//! initiator uses the first candidate that can open a room. The responder
//! uses the first candidate that accepts the token, and moves on to the
//! next one when [`ChannelConfig::connect_timeout`] passes without a
//! connection. Only the active candidate is polled, and only its events
//! reach the registered handlers.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use web_time::Instant;

use crate::network::channel::{
    Channel, ChannelError, ConnectionHandler, Handlers, MessageHandler, RoomToken,
};
use crate::network::messages::Message;
use crate::report_violation;
use crate::sessions::config::ChannelConfig;
use crate::telemetry::{ViolationKind, ViolationSeverity};

#[derive(Debug)]
enum Forwarded {
    Message(Message),
    Connected,
    Disconnected,
}

type Inbox = Arc<Mutex<VecDeque<(usize, Forwarded)>>>;

#[derive(Debug)]
struct PendingResponder {
    token: RoomToken,
    started: Instant,
}

/// Composite channel over an ordered list of candidates.
///
/// ```
/// use year_duel::{Channel, ChannelConfig, FallbackChannel, LocalHub, UdpChannel};
///
/// let hub = LocalHub::new();
/// let mut host = hub.channel();
/// let token = host.establish_as_initiator()?;
///
/// // A six-character room token is not an address, so UDP declines it
/// let udp = UdpChannel::bind_to_port(0, ChannelConfig::lan())?;
/// let mut guest = FallbackChannel::new(
///     vec![Box::new(udp), Box::new(hub.channel())],
///     ChannelConfig::lan(),
/// );
/// guest.establish_as_responder(&token)?;
/// assert_eq!(guest.active_kind(), Some("local"));
/// # Ok::<(), year_duel::ChannelError>(())
/// ```
pub struct FallbackChannel {
    candidates: Vec<Box<dyn Channel>>,
    config: ChannelConfig,
    active: Option<usize>,
    pending: Option<PendingResponder>,
    exhausted: bool,
    inbox: Inbox,
    handlers: Handlers,
}

impl FallbackChannel {
    /// Creates a fallback over `candidates`, tried in order.
    pub fn new(candidates: Vec<Box<dyn Channel>>, config: ChannelConfig) -> Self {
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let mut candidates = candidates;
        for (index, candidate) in candidates.iter_mut().enumerate() {
            let sink = Arc::clone(&inbox);
            candidate.on_message(Box::new(move |message| {
                sink.lock().push_back((index, Forwarded::Message(message)));
            }));
            let sink = Arc::clone(&inbox);
            candidate.on_connected(Box::new(move || {
                sink.lock().push_back((index, Forwarded::Connected));
            }));
            let sink = Arc::clone(&inbox);
            candidate.on_disconnected(Box::new(move || {
                sink.lock().push_back((index, Forwarded::Disconnected));
            }));
        }
        Self {
            candidates,
            config,
            active: None,
            pending: None,
            exhausted: false,
            inbox,
            handlers: Handlers::default(),
        }
    }

    /// Position of the candidate in use.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Transport label of the candidate in use.
    #[must_use]
    pub fn active_kind(&self) -> Option<&'static str> {
        self.active
            .and_then(|index| self.candidates.get(index))
            .map(|candidate| candidate.kind())
    }

    /// True once every candidate has failed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn establish_responder_from(&mut self, start: usize, token: &RoomToken) -> Result<(), ChannelError> {
        for (index, candidate) in self.candidates.iter_mut().enumerate().skip(start) {
            match candidate.establish_as_responder(token) {
                Ok(()) => {
                    info!(transport = candidate.kind(), index, "fallback responder candidate selected");
                    self.active = Some(index);
                    self.pending = Some(PendingResponder {
                        token: token.clone(),
                        started: Instant::now(),
                    });
                    return Ok(());
                },
                Err(err) => {
                    debug!(transport = candidate.kind(), %err, "fallback candidate declined the token");
                },
            }
        }
        self.active = None;
        self.pending = None;
        self.exhausted = true;
        Err(ChannelError::Exhausted)
    }

    fn check_connect_timeout(&mut self) {
        let Some(index) = self.active else {
            return;
        };
        let connected = self
            .candidates
            .get(index)
            .is_some_and(|candidate| candidate.is_connected());
        let Some(pending) = self.pending.as_ref() else {
            return;
        };
        if connected {
            self.pending = None;
            return;
        }
        if pending.started.elapsed() <= self.config.connect_timeout {
            return;
        }
        let token = pending.token.clone();
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::Channel,
            "{} transport did not connect within {}ms, trying the next one",
            self.active_kind().unwrap_or("unknown"),
            self.config.connect_timeout.as_millis()
        );
        if self.establish_responder_from(index + 1, &token).is_err() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Channel,
                "no transport could reach room {}",
                token
            );
        }
    }
}

impl Channel for FallbackChannel {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        if self.active.is_some() {
            return Err(ChannelError::AlreadyEstablished);
        }
        for (index, candidate) in self.candidates.iter_mut().enumerate() {
            match candidate.establish_as_initiator() {
                Ok(token) => {
                    info!(transport = candidate.kind(), index, %token, "fallback initiator candidate selected");
                    self.active = Some(index);
                    return Ok(token);
                },
                Err(err) => {
                    debug!(transport = candidate.kind(), %err, "fallback candidate unavailable");
                },
            }
        }
        self.exhausted = true;
        Err(ChannelError::Exhausted)
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        if self.active.is_some() {
            return Err(ChannelError::AlreadyEstablished);
        }
        self.establish_responder_from(0, token)
    }

    fn send(&mut self, message: &Message) -> bool {
        self.active
            .and_then(|index| self.candidates.get_mut(index))
            .is_some_and(|candidate| candidate.send(message))
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.handlers.set_message(handler);
    }

    fn on_connected(&mut self, handler: ConnectionHandler) {
        self.handlers.set_connected(handler);
    }

    fn on_disconnected(&mut self, handler: ConnectionHandler) {
        self.handlers.set_disconnected(handler);
    }

    fn poll(&mut self) {
        let Some(index) = self.active else {
            return;
        };
        if let Some(candidate) = self.candidates.get_mut(index) {
            candidate.poll();
        }
        let forwarded: Vec<_> = self.inbox.lock().drain(..).collect();
        for (from, event) in forwarded {
            // Events from abandoned candidates are stale
            if from != index {
                continue;
            }
            match event {
                Forwarded::Message(message) => self.handlers.message(message),
                Forwarded::Connected => self.handlers.connected(),
                Forwarded::Disconnected => self.handlers.disconnected(),
            }
        }
        self.check_connect_timeout();
    }

    fn is_connected(&self) -> bool {
        self.active
            .and_then(|index| self.candidates.get(index))
            .is_some_and(|candidate| candidate.is_connected())
    }

    fn kind(&self) -> &'static str {
        "fallback"
    }
}

impl std::fmt::Debug for FallbackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&'static str> = self.candidates.iter().map(|c| c.kind()).collect();
        f.debug_struct("FallbackChannel")
            .field("candidates", &kinds)
            .field("active", &self.active)
            .field("pending", &self.pending)
            .field("exhausted", &self.exhausted)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::local_channel::LocalHub;
    use web_time::Duration;

    /// Accepts any establishment but never connects.
    #[derive(Default)]
    struct SilentChannel {
        available: bool,
    }

    impl Channel for SilentChannel {
        fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
            if self.available {
                Ok(RoomToken::from("silent"))
            } else {
                Err(ChannelError::Unavailable {
                    reason: "test".to_owned(),
                })
            }
        }

        fn establish_as_responder(&mut self, _token: &RoomToken) -> Result<(), ChannelError> {
            if self.available {
                Ok(())
            } else {
                Err(ChannelError::Unavailable {
                    reason: "test".to_owned(),
                })
            }
        }

        fn send(&mut self, _message: &Message) -> bool {
            false
        }

        fn on_message(&mut self, _handler: MessageHandler) {}

        fn on_connected(&mut self, _handler: ConnectionHandler) {}

        fn on_disconnected(&mut self, _handler: ConnectionHandler) {}

        fn poll(&mut self) {}

        fn is_connected(&self) -> bool {
            false
        }

        fn kind(&self) -> &'static str {
            "silent"
        }
    }

    fn quick_config() -> ChannelConfig {
        ChannelConfig {
            connect_timeout: Duration::from_millis(20),
            ..ChannelConfig::lan()
        }
    }

    #[test]
    fn initiator_skips_unavailable_candidates() {
        let hub = LocalHub::with_seed(1);
        let mut channel = FallbackChannel::new(
            vec![Box::new(SilentChannel::default()), Box::new(hub.channel())],
            quick_config(),
        );
        let token = channel.establish_as_initiator().unwrap();
        assert_eq!(token.as_str().len(), 6);
        assert_eq!(channel.active_index(), Some(1));
        assert_eq!(channel.active_kind(), Some("local"));
    }

    #[test]
    fn all_candidates_failing_is_exhaustion() {
        let mut channel = FallbackChannel::new(
            vec![Box::new(SilentChannel::default())],
            quick_config(),
        );
        assert_eq!(
            channel.establish_as_initiator().unwrap_err(),
            ChannelError::Exhausted
        );
        assert!(channel.is_exhausted());
    }

    #[test]
    fn responder_moves_on_after_connect_timeout() {
        let hub = LocalHub::with_seed(2);
        let mut host = hub.channel();
        let token = host.establish_as_initiator().unwrap();

        let mut guest = FallbackChannel::new(
            vec![
                Box::new(SilentChannel { available: true }),
                Box::new(hub.channel()),
            ],
            quick_config(),
        );
        let connected = Arc::new(Mutex::new(false));
        let flag = connected.clone();
        guest.on_connected(Box::new(move || *flag.lock() = true));

        guest.establish_as_responder(&token).unwrap();
        assert_eq!(guest.active_kind(), Some("silent"));
        guest.poll();
        assert!(!guest.is_connected());

        std::thread::sleep(std::time::Duration::from_millis(40));
        guest.poll();
        assert_eq!(guest.active_kind(), Some("local"));
        guest.poll();
        host.poll();
        assert!(guest.is_connected());
        assert!(*connected.lock());
    }

    #[test]
    fn messages_flow_through_the_active_candidate() {
        let hub = LocalHub::with_seed(3);
        let mut host = FallbackChannel::new(vec![Box::new(hub.channel())], quick_config());
        let mut guest = FallbackChannel::new(vec![Box::new(hub.channel())], quick_config());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        host.on_message(Box::new(move |message| sink.lock().push(message)));

        let token = host.establish_as_initiator().unwrap();
        guest.establish_as_responder(&token).unwrap();
        guest.poll();
        host.poll();
        assert!(guest.send(&Message::Reset { game: 2 }));
        host.poll();
        assert_eq!(*received.lock(), vec![Message::Reset { game: 2 }]);
        assert_eq!(guest.kind(), "fallback");
    }

    #[test]
    fn establishing_twice_fails() {
        let hub = LocalHub::with_seed(4);
        let mut channel = FallbackChannel::new(vec![Box::new(hub.channel())], quick_config());
        channel.establish_as_initiator().unwrap();
        assert_eq!(
            channel.establish_as_initiator().unwrap_err(),
            ChannelError::AlreadyEstablished
        );
    }
}
