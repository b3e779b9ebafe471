//! Same-process channel pairs.
//!
//! A [`LocalHub`] is a registry of rooms shared by every channel it creates.
//! The initiator opens a room under a six-character token and the single
//! responder joins with that token. Messages are queued in the hub and
//! delivered on the receiver's next [`Channel::poll`]. This is the degraded
//! "same device" transport and the one used by most tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::network::channel::{
    Channel, ChannelError, ConnectionHandler, Handlers, MessageHandler, RoomToken,
};
use crate::network::messages::Message;
use crate::rng::{Pcg32, Rng, SeedableRng};

/// Length of generated room tokens.
pub const TOKEN_LENGTH: usize = 6;

/// Characters used in generated tokens. Look-alikes (0/O, 1/I) are left out.
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Initiator,
    Responder,
}

#[derive(Debug, Default)]
struct Room {
    to_initiator: VecDeque<Message>,
    to_responder: VecDeque<Message>,
    initiator_open: bool,
    responder_joined: bool,
    responder_open: bool,
}

impl Room {
    fn peer_present(&self, side: Side) -> bool {
        match side {
            Side::Initiator => self.responder_joined && self.responder_open,
            Side::Responder => self.initiator_open,
        }
    }

    fn inbox(&mut self, side: Side) -> &mut VecDeque<Message> {
        match side {
            Side::Initiator => &mut self.to_initiator,
            Side::Responder => &mut self.to_responder,
        }
    }
}

#[derive(Debug)]
struct HubState {
    rooms: BTreeMap<String, Room>,
    rng: Pcg32,
}

/// Shared room registry for [`LocalChannel`]s. Cloning shares the registry.
///
/// ```
/// use year_duel::{Channel, LocalHub};
///
/// let hub = LocalHub::new();
/// let mut host = hub.channel();
/// let mut guest = hub.channel();
/// let token = host.establish_as_initiator()?;
/// guest.establish_as_responder(&token)?;
/// guest.poll();
/// host.poll();
/// assert!(host.is_connected() && guest.is_connected());
/// # Ok::<(), year_duel::ChannelError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::with_rng(Pcg32::from_entropy())
    }
}

impl LocalHub {
    /// Creates an empty hub with entropy-seeded tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty hub whose tokens are reproducible.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(Pcg32::seed_from_u64(seed))
    }

    fn with_rng(rng: Pcg32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                rooms: BTreeMap::new(),
                rng,
            })),
        }
    }

    /// Creates an unestablished channel attached to this hub.
    #[must_use]
    pub fn channel(&self) -> LocalChannel {
        LocalChannel {
            hub: self.clone(),
            endpoint: None,
            connected: false,
            handlers: Handlers::default(),
        }
    }

    /// Number of open rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    fn open_room(&self) -> RoomToken {
        let mut state = self.state.lock();
        loop {
            let token: String = (0..TOKEN_LENGTH)
                .map(|_| {
                    let index = state.rng.gen_range_usize(0..TOKEN_ALPHABET.len());
                    TOKEN_ALPHABET.get(index).copied().map_or('A', char::from)
                })
                .collect();
            if !state.rooms.contains_key(&token) {
                state.rooms.insert(
                    token.clone(),
                    Room {
                        initiator_open: true,
                        ..Room::default()
                    },
                );
                return RoomToken::new(token);
            }
        }
    }

    fn join_room(&self, token: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let room = state
            .rooms
            .get_mut(token)
            .ok_or_else(|| ChannelError::RoomNotFound {
                token: token.to_owned(),
            })?;
        if room.responder_joined {
            return Err(ChannelError::RoomFull);
        }
        room.responder_joined = true;
        room.responder_open = true;
        Ok(())
    }

    fn close(&self, token: &str, side: Side) {
        let mut state = self.state.lock();
        let remove = match state.rooms.get_mut(token) {
            Some(room) => {
                match side {
                    Side::Initiator => room.initiator_open = false,
                    Side::Responder => room.responder_open = false,
                }
                !room.initiator_open && !room.responder_open
            },
            None => false,
        };
        if remove {
            state.rooms.remove(token);
            debug!(token, "local room closed");
        }
    }
}

fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LENGTH && token.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

#[derive(Debug)]
struct Endpoint {
    token: String,
    side: Side,
}

/// One end of a same-process channel. Created by [`LocalHub::channel`].
///
/// Dropping the channel closes its side of the room; the peer sees a
/// disconnect on its next poll.
#[derive(Debug)]
pub struct LocalChannel {
    hub: LocalHub,
    endpoint: Option<Endpoint>,
    connected: bool,
    handlers: Handlers,
}

impl LocalChannel {
    /// The room this channel belongs to, once established.
    #[must_use]
    pub fn room_token(&self) -> Option<RoomToken> {
        self.endpoint
            .as_ref()
            .map(|endpoint| RoomToken::new(endpoint.token.as_str()))
    }
}

impl Channel for LocalChannel {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        if self.endpoint.is_some() {
            return Err(ChannelError::AlreadyEstablished);
        }
        let token = self.hub.open_room();
        info!(%token, "local room opened");
        self.endpoint = Some(Endpoint {
            token: token.as_str().to_owned(),
            side: Side::Initiator,
        });
        Ok(token)
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        if self.endpoint.is_some() {
            return Err(ChannelError::AlreadyEstablished);
        }
        let normalized = token.as_str().trim().to_ascii_uppercase();
        if !is_valid_token(&normalized) {
            return Err(ChannelError::InvalidRoomToken {
                token: token.as_str().to_owned(),
            });
        }
        self.hub.join_room(&normalized)?;
        info!(token = %normalized, "joined local room");
        self.endpoint = Some(Endpoint {
            token: normalized,
            side: Side::Responder,
        });
        Ok(())
    }

    fn send(&mut self, message: &Message) -> bool {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return false;
        };
        if !self.connected {
            return false;
        }
        let mut state = self.hub.state.lock();
        let Some(room) = state.rooms.get_mut(&endpoint.token) else {
            return false;
        };
        if !room.peer_present(endpoint.side) {
            return false;
        }
        let peer = match endpoint.side {
            Side::Initiator => Side::Responder,
            Side::Responder => Side::Initiator,
        };
        room.inbox(peer).push_back(message.clone());
        true
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
        let Some(endpoint) = self.endpoint.as_ref() else {
            return;
        };
        // Collect under the lock, dispatch after releasing it
        let (peer_present, inbox) = {
            let mut state = self.hub.state.lock();
            match state.rooms.get_mut(&endpoint.token) {
                Some(room) => (
                    room.peer_present(endpoint.side),
                    room.inbox(endpoint.side).drain(..).collect::<Vec<_>>(),
                ),
                None => (false, Vec::new()),
            }
        };

        if peer_present && !self.connected {
            self.connected = true;
            debug!(token = %endpoint.token, "local peer connected");
            self.handlers.connected();
        }
        for message in inbox {
            self.handlers.message(message);
        }
        if !peer_present && self.connected {
            self.connected = false;
            debug!("local peer left");
            self.handlers.disconnected();
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            self.hub.close(&endpoint.token, endpoint.side);
        }
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn connected_pair(hub: &LocalHub) -> (LocalChannel, LocalChannel) {
        let mut host = hub.channel();
        let mut guest = hub.channel();
        let token = host.establish_as_initiator().unwrap();
        guest.establish_as_responder(&token).unwrap();
        host.poll();
        guest.poll();
        (host, guest)
    }

    #[test]
    fn tokens_are_six_unambiguous_characters() {
        let hub = LocalHub::with_seed(5);
        let mut channel = hub.channel();
        let token = channel.establish_as_initiator().unwrap();
        assert!(is_valid_token(token.as_str()), "{token}");
        assert_eq!(hub.room_count(), 1);
    }

    #[test]
    fn messages_arrive_on_the_next_poll() {
        let hub = LocalHub::with_seed(1);
        let (mut host, mut guest) = connected_pair(&hub);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        guest.on_message(Box::new(move |message| sink.lock().push(message)));

        assert!(host.send(&Message::Reset { game: 1 }));
        assert!(received.lock().is_empty());
        guest.poll();
        assert_eq!(*received.lock(), vec![Message::Reset { game: 1 }]);
    }

    #[test]
    fn second_responder_is_rejected() {
        let hub = LocalHub::with_seed(2);
        let mut host = hub.channel();
        let token = host.establish_as_initiator().unwrap();
        hub.channel().establish_as_responder(&token).unwrap();
        let err = hub.channel().establish_as_responder(&token).unwrap_err();
        assert_eq!(err, ChannelError::RoomFull);
    }

    #[test]
    fn unknown_and_malformed_tokens() {
        let hub = LocalHub::with_seed(3);
        let err = hub
            .channel()
            .establish_as_responder(&RoomToken::from("ABCDEF"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::RoomNotFound { .. }));
        let err = hub
            .channel()
            .establish_as_responder(&RoomToken::from("no"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidRoomToken { .. }));
    }

    #[test]
    fn tokens_are_case_insensitive() {
        let hub = LocalHub::with_seed(4);
        let mut host = hub.channel();
        let token = host.establish_as_initiator().unwrap();
        let lower = RoomToken::new(token.as_str().to_ascii_lowercase());
        assert!(hub.channel().establish_as_responder(&lower).is_ok());
    }

    #[test]
    fn send_before_connect_is_refused() {
        let hub = LocalHub::with_seed(6);
        let mut host = hub.channel();
        assert!(!host.send(&Message::Reset { game: 0 }));
        host.establish_as_initiator().unwrap();
        assert!(!host.send(&Message::Reset { game: 0 }));
    }

    #[test]
    fn dropping_a_side_disconnects_the_peer() {
        let hub = LocalHub::with_seed(7);
        let (mut host, guest) = connected_pair(&hub);
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        host.on_disconnected(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        drop(guest);
        host.poll();
        host.poll();
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!host.is_connected());
        drop(host);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn establishing_twice_fails() {
        let hub = LocalHub::with_seed(8);
        let mut host = hub.channel();
        host.establish_as_initiator().unwrap();
        assert_eq!(
            host.establish_as_initiator().unwrap_err(),
            ChannelError::AlreadyEstablished
        );
    }
}
