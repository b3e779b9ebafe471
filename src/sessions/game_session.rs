use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use web_time::{Duration, Instant};

use crate::catalog::InventionFact;
use crate::coordinator::{AdvanceOutcome, CoordinatorState, GuessOutcome, Mode, RoundCoordinator};
use crate::error::{GameError, GameResult};
use crate::game_state::{GameState, GameSummary, PerRole, Role, RoundState};
use crate::network::channel::{Channel, RoomToken};
use crate::network::messages::Message;
use crate::sessions::config::SessionConfig;
use crate::sessions::event_drain::EventDrain;
use crate::GameEvent;

/// What a channel handler observed, queued until the next [`GameSession::poll`].
#[derive(Debug)]
enum ChannelEvent {
    Connected,
    Disconnected,
    Message(Message),
}

type ChannelInbox = Arc<Mutex<VecDeque<ChannelEvent>>>;

/// The local guess that is waiting on the peer.
#[derive(Debug, Clone, Copy)]
struct PendingGuess {
    game: u64,
    round_index: u32,
    since: Instant,
    last_sent: Instant,
}

/// A [`GameSession`] binds a [`RoundCoordinator`] to an optional [`Channel`].
///
/// A local session (both players on one device) has no channel. A networked
/// session forwards the coordinator's outbox into the channel and applies
/// whatever the channel delivers. Channel callbacks only enqueue; nothing
/// reaches the coordinator until [`poll`](Self::poll) runs, so all state
/// changes happen on the caller's thread.
///
/// Build one with [`SessionBuilder`](crate::SessionBuilder).
pub struct GameSession {
    coordinator: RoundCoordinator,
    channel: Option<Box<dyn Channel>>,
    inbox: ChannelInbox,
    room_token: Option<RoomToken>,
    guess_timeout: Option<Duration>,
    pending_guess: Option<PendingGuess>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("coordinator", &self.coordinator)
            .field("channel", &self.channel.as_ref().map(|c| c.kind()))
            .field("room_token", &self.room_token)
            .field("guess_timeout", &self.guess_timeout)
            .field("pending_guess", &self.pending_guess)
            .finish_non_exhaustive()
    }
}

impl GameSession {
    pub(crate) fn new(
        coordinator: RoundCoordinator,
        mut channel: Option<Box<dyn Channel>>,
        room_token: Option<RoomToken>,
        config: SessionConfig,
    ) -> Self {
        let inbox: ChannelInbox = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(channel) = channel.as_mut() {
            let queue = Arc::clone(&inbox);
            channel.on_message(Box::new(move |message| {
                queue.lock().push_back(ChannelEvent::Message(message));
            }));
            let queue = Arc::clone(&inbox);
            channel.on_connected(Box::new(move || {
                queue.lock().push_back(ChannelEvent::Connected);
            }));
            let queue = Arc::clone(&inbox);
            channel.on_disconnected(Box::new(move || {
                queue.lock().push_back(ChannelEvent::Disconnected);
            }));
        }
        Self {
            coordinator,
            channel,
            inbox,
            room_token,
            guess_timeout: config.guess_timeout,
            pending_guess: None,
        }
    }

    // ##########
    // # Lobby  #
    // ##########

    /// Host side: starts a game against the guest that joined.
    ///
    /// # Errors
    /// - [`GameError::MissingName`] if `host_name` is blank.
    /// - [`GameError::GuestNotJoined`] if no guest has announced itself yet.
    /// - [`GameError::InvalidRequest`] on a guest, in a local session, or while
    ///   a game is running.
    pub fn start_game(&mut self, host_name: &str) -> GameResult<()> {
        if self.coordinator.mode() == Mode::Local {
            return Err(GameError::invalid_request(
                "a local game needs both names, use start_local_game",
            ));
        }
        let host_name = validated_name(host_name, Role::Host)?;
        let guest_name = self.coordinator.names().guest.clone();
        let result = self.coordinator.start_game(PerRole::new(host_name, guest_name));
        self.flush();
        result
    }

    /// Local session: starts a game with both players on this device.
    ///
    /// # Errors
    /// - [`GameError::MissingName`] if either name is blank.
    /// - [`GameError::InvalidRequest`] in a networked session or while a game is running.
    pub fn start_local_game(&mut self, host_name: &str, guest_name: &str) -> GameResult<()> {
        if self.coordinator.mode() != Mode::Local {
            return Err(GameError::invalid_request(
                "start_local_game is only available in a local session",
            ));
        }
        let names = PerRole::new(
            validated_name(host_name, Role::Host)?,
            validated_name(guest_name, Role::Guest)?,
        );
        self.coordinator.start_game(names)
    }

    /// Guest side: announces the guest's name to the host.
    ///
    /// If the channel is not connected yet the announcement is repeated once
    /// it is.
    ///
    /// # Errors
    /// [`GameError::MissingName`] for a blank name, [`GameError::InvalidRequest`]
    /// outside a networked guest session.
    pub fn join_as_guest(&mut self, guest_name: &str) -> GameResult<()> {
        let guest_name = validated_name(guest_name, Role::Guest)?;
        let result = self.coordinator.join_as_guest(&guest_name);
        self.flush();
        result
    }

    // ##########
    // # Rounds #
    // ##########

    /// Networked session: submits the local player's guess.
    ///
    /// # Errors
    /// [`GameError::InvalidRequest`] in a local session; use
    /// [`submit_guess_for`](Self::submit_guess_for) there.
    pub fn submit_guess(&mut self, value: i64) -> GameResult<GuessOutcome> {
        let Some(role) = self.coordinator.local_role() else {
            return Err(GameError::invalid_request(
                "a local session needs a role, use submit_guess_for",
            ));
        };
        self.submit_guess_for(role, value)
    }

    /// Submits a guess for `role`.
    ///
    /// In a networked session only the local role is accepted; a guess for
    /// the remote role yields [`GuessOutcome::NotAccepting`].
    ///
    /// # Errors
    /// Never fails today; the signature matches the other boundary operations.
    pub fn submit_guess_for(&mut self, role: Role, value: i64) -> GameResult<GuessOutcome> {
        let outcome = self.coordinator.submit_guess(role, value);
        if outcome == GuessOutcome::Recorded && self.coordinator.local_role() == Some(role) {
            self.track_pending_guess();
        }
        self.flush();
        Ok(outcome)
    }

    /// Parses `input` as a year and submits it for `role`.
    ///
    /// ```
    /// use year_duel::{GameError, Role, SessionBuilder};
    ///
    /// let mut session = SessionBuilder::new().start_local_session()?;
    /// session.start_local_game("Ada", "Brook")?;
    /// assert!(matches!(
    ///     session.submit_guess_input(Role::Host, "soon"),
    ///     Err(GameError::InvalidGuess { .. })
    /// ));
    /// session.submit_guess_input(Role::Host, " -450 ")?;
    /// # Ok::<(), GameError>(())
    /// ```
    ///
    /// # Errors
    /// [`GameError::InvalidGuess`] if `input` is not an integer.
    pub fn submit_guess_input(&mut self, role: Role, input: &str) -> GameResult<GuessOutcome> {
        let value = input
            .trim()
            .parse::<i64>()
            .map_err(|_| GameError::InvalidGuess {
                input: input.to_owned(),
            })?;
        self.submit_guess_for(role, value)
    }

    /// Host (or local) side: moves past a resolved round.
    ///
    /// # Errors
    /// See [`RoundCoordinator::advance_round`].
    pub fn advance_round(&mut self) -> GameResult<AdvanceOutcome> {
        let result = self.coordinator.advance_round();
        self.flush();
        result
    }

    /// Abandons the game on both sides.
    pub fn reset_game(&mut self) {
        self.coordinator.reset_game();
        self.pending_guess = None;
        self.flush();
    }

    // ##########
    // # Pump   #
    // ##########

    /// Drives the channel, applies whatever it delivered, sends queued
    /// messages and checks the guess timeout.
    ///
    /// Call this regularly, e.g. once per UI frame. A local session has
    /// nothing to pump and returns immediately.
    pub fn poll(&mut self) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        channel.poll();

        let received: Vec<ChannelEvent> = self.inbox.lock().drain(..).collect();
        for event in received {
            match event {
                ChannelEvent::Connected => self.coordinator.handle_peer_connected(),
                ChannelEvent::Disconnected => self.coordinator.handle_peer_disconnected(),
                ChannelEvent::Message(message) => self.coordinator.handle_message(message),
            }
        }

        self.check_guess_timeout(Instant::now());
        self.flush();
    }

    /// Drains events produced since the last call.
    pub fn events(&mut self) -> EventDrain<'_> {
        self.coordinator.drain_events()
    }

    fn flush(&mut self) {
        let outbox = self.coordinator.take_outbox();
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        for message in outbox {
            if channel.send(&message) {
                trace!(kind = message.kind(), "message sent");
            } else {
                debug!(kind = message.kind(), "message dropped, channel not connected");
            }
        }
    }

    fn track_pending_guess(&mut self) {
        let Some(round) = self.coordinator.round() else {
            return;
        };
        if self.coordinator.state() != CoordinatorState::RoundActive {
            return;
        }
        let now = Instant::now();
        self.pending_guess = Some(PendingGuess {
            game: self.coordinator.game_number(),
            round_index: round.round_index(),
            since: now,
            last_sent: now,
        });
    }

    fn check_guess_timeout(&mut self, now: Instant) {
        let (Some(timeout), Some(mut pending)) = (self.guess_timeout, self.pending_guess) else {
            return;
        };
        // A guest keeps repeating from RoundResolved until the host's
        // NextRound or GameOver arrives.
        let state = self.coordinator.state();
        let waiting_state = state == CoordinatorState::RoundActive
            || (state == CoordinatorState::RoundResolved
                && self.coordinator.local_role() == Some(Role::Guest));
        let still_waiting = waiting_state
            && self.coordinator.game_number() == pending.game
            && self
                .coordinator
                .round()
                .is_some_and(|round| round.round_index() == pending.round_index);
        if !still_waiting {
            self.pending_guess = None;
            return;
        }
        if now.duration_since(pending.last_sent) < timeout {
            return;
        }
        let resent = self.coordinator.resend_local_guess();
        if let (Some(round_index), CoordinatorState::RoundActive) = (resent, state) {
            let waited = now.duration_since(pending.since);
            warn!(round = round_index, ?waited, "peer guess overdue, local guess re-sent");
            self.coordinator.push_event(GameEvent::PeerGuessOverdue {
                round_index,
                waited,
            });
        }
        if resent.is_some() && state == CoordinatorState::RoundResolved {
            debug!(round = pending.round_index, "host progress overdue, local guess re-sent");
        }
        pending.last_sent = now;
        self.pending_guess = Some(pending);
    }

    // ##########
    // # Access #
    // ##########

    /// The token the guest needs to join. `None` for a local session.
    #[must_use]
    pub fn room_token(&self) -> Option<&RoomToken> {
        self.room_token.as_ref()
    }

    /// The coordinator's lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    /// The current round, if a game is running.
    #[must_use]
    pub fn round(&self) -> Option<&RoundState> {
        self.coordinator.round()
    }

    /// The item of the current round.
    #[must_use]
    pub fn current_item(&self) -> Option<&InventionFact> {
        self.coordinator.round().map(RoundState::item)
    }

    /// The current game, if any.
    #[must_use]
    pub fn game(&self) -> Option<&GameState> {
        self.coordinator.game()
    }

    /// Totals, winner and history of the current game.
    #[must_use]
    pub fn summary(&self) -> Option<GameSummary> {
        self.coordinator.summary()
    }

    /// This peer's role, `None` for a local session.
    #[must_use]
    pub fn local_role(&self) -> Option<Role> {
        self.coordinator.local_role()
    }

    /// Whether the channel reports a connected peer. Always `false` locally.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_connected())
    }

    /// The underlying coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &RoundCoordinator {
        &self.coordinator
    }

    #[cfg(test)]
    pub(crate) fn coordinator_mut(&mut self) -> &mut RoundCoordinator {
        &mut self.coordinator
    }
}

fn validated_name(name: &str, role: Role) -> GameResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GameError::MissingName { role });
    }
    Ok(trimmed.to_owned())
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, InventionFact};
    use crate::network::local_channel::LocalHub;
    use crate::sessions::builder::SessionBuilder;

    fn fork_catalog() -> Catalog {
        Catalog::new(vec![InventionFact::new("Fork", 1000, "Once considered scandalous")]).unwrap()
    }

    fn networked_pair(builder: impl Fn() -> SessionBuilder) -> (GameSession, GameSession) {
        let hub = LocalHub::with_seed(17);
        let host = builder().start_host_session(hub.channel()).unwrap();
        let token = host.room_token().cloned().unwrap();
        let guest = builder().start_guest_session(hub.channel(), &token).unwrap();
        (host, guest)
    }

    fn pump(host: &mut GameSession, guest: &mut GameSession) {
        for _ in 0..4 {
            host.poll();
            guest.poll();
        }
    }

    fn joined_pair() -> (GameSession, GameSession) {
        let (mut host, mut guest) =
            networked_pair(|| SessionBuilder::new().with_catalog(fork_catalog()).with_total_rounds(2));
        guest.join_as_guest("Brook").unwrap();
        pump(&mut host, &mut guest);
        (host, guest)
    }

    #[test]
    fn local_game_runs_without_polling() {
        let mut session = SessionBuilder::new()
            .with_catalog(fork_catalog())
            .with_total_rounds(1)
            .start_local_session()
            .unwrap();
        session.start_local_game("Ada", "Brook").unwrap();
        assert_eq!(
            session.submit_guess_for(Role::Host, 1200).unwrap(),
            GuessOutcome::Recorded
        );
        assert_eq!(
            session.submit_guess_for(Role::Guest, 500).unwrap(),
            GuessOutcome::Resolved
        );
        assert_eq!(
            session.advance_round().unwrap(),
            AdvanceOutcome::GameComplete {
                winner: Some(Role::Host)
            }
        );
        let summary = session.summary().unwrap();
        assert_eq!(summary.scores, PerRole::new(300, 200));
    }

    #[test]
    fn blank_names_are_rejected_at_the_boundary() {
        let mut session = SessionBuilder::new().start_local_session().unwrap();
        assert_eq!(
            session.start_local_game("  ", "Brook"),
            Err(GameError::MissingName { role: Role::Host })
        );
        assert_eq!(
            session.start_local_game("Ada", ""),
            Err(GameError::MissingName { role: Role::Guest })
        );
        assert_eq!(session.state(), CoordinatorState::AwaitingPlayers);
    }

    #[test]
    fn local_and_networked_entry_points_do_not_mix() {
        let mut local = SessionBuilder::new().start_local_session().unwrap();
        assert!(matches!(
            local.start_game("Ada"),
            Err(GameError::InvalidRequest { .. })
        ));
        local.start_local_game("Ada", "Brook").unwrap();
        assert!(matches!(
            local.submit_guess(1900),
            Err(GameError::InvalidRequest { .. })
        ));

        let (mut host, _guest) = networked_pair(SessionBuilder::new);
        assert!(matches!(
            host.start_local_game("Ada", "Brook"),
            Err(GameError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn unparseable_guess_is_rejected_before_the_coordinator() {
        let mut session = SessionBuilder::new().start_local_session().unwrap();
        session.start_local_game("Ada", "Brook").unwrap();
        let err = session.submit_guess_input(Role::Guest, "12ab").unwrap_err();
        assert_eq!(
            err,
            GameError::InvalidGuess {
                input: "12ab".to_owned()
            }
        );
        assert_eq!(session.round().unwrap().guess(Role::Guest), None);
    }

    #[test]
    fn host_cannot_start_before_guest_joins() {
        let (mut host, mut guest) = networked_pair(SessionBuilder::new);
        pump(&mut host, &mut guest);
        assert!(host.is_connected());
        assert_eq!(host.start_game("Ada"), Err(GameError::GuestNotJoined));
    }

    #[test]
    fn join_before_connection_is_delivered_once_connected() {
        let (host, guest) = joined_pair();
        assert!(host.coordinator().guest_joined());
        assert_eq!(host.coordinator().names().guest, "Brook");
        assert_eq!(guest.state(), CoordinatorState::AwaitingPlayers);
    }

    #[test]
    fn networked_round_reaches_both_sides() {
        let (mut host, mut guest) = joined_pair();
        host.start_game("Ada").unwrap();
        pump(&mut host, &mut guest);
        assert_eq!(guest.state(), CoordinatorState::RoundActive);
        assert_eq!(guest.current_item().unwrap().name, "Fork");

        guest.submit_guess(500).unwrap();
        host.submit_guess(1200).unwrap();
        pump(&mut host, &mut guest);
        assert_eq!(host.state(), CoordinatorState::RoundResolved);
        assert_eq!(guest.state(), CoordinatorState::RoundResolved);
        assert_eq!(guest.game().unwrap().scores(), PerRole::new(300, 200));

        assert!(guest.advance_round().is_err());
        host.advance_round().unwrap();
        pump(&mut host, &mut guest);
        assert_eq!(guest.round().unwrap().round_index(), 2);
    }

    #[test]
    fn reset_returns_both_sides_to_idle() {
        let (mut host, mut guest) = joined_pair();
        host.start_game("Ada").unwrap();
        pump(&mut host, &mut guest);
        guest.reset_game();
        pump(&mut host, &mut guest);
        assert_eq!(host.state(), CoordinatorState::Idle);
        assert_eq!(guest.state(), CoordinatorState::Idle);
        assert!(host.events().any(|e| e == GameEvent::GameReset));
    }

    #[test]
    fn overdue_peer_guess_is_re_sent() {
        let (mut host, mut guest) = networked_pair(|| {
            SessionBuilder::new()
                .with_catalog(fork_catalog())
                .with_guess_timeout(Duration::from_millis(100))
        });
        guest.join_as_guest("Brook").unwrap();
        pump(&mut host, &mut guest);
        host.start_game("Ada").unwrap();
        pump(&mut host, &mut guest);
        host.submit_guess(1000).unwrap();
        let _ = host.events().count();

        let later = Instant::now() + Duration::from_millis(150);
        host.check_guess_timeout(later);
        let overdue: Vec<GameEvent> = host
            .events()
            .filter(|e| matches!(e, GameEvent::PeerGuessOverdue { .. }))
            .collect();
        assert_eq!(overdue.len(), 1);
        assert!(matches!(
            overdue[0],
            GameEvent::PeerGuessOverdue { round_index: 1, waited } if waited >= Duration::from_millis(100)
        ));
        assert_eq!(host.coordinator_mut().take_outbox().len(), 1);

        // A second check inside the timeout window stays quiet.
        host.check_guess_timeout(later + Duration::from_millis(10));
        assert_eq!(host.events().count(), 0);
    }

    #[test]
    fn resolved_round_clears_the_pending_guess() {
        let (mut host, mut guest) = networked_pair(|| {
            SessionBuilder::new()
                .with_catalog(fork_catalog())
                .with_guess_timeout(Duration::from_millis(100))
        });
        guest.join_as_guest("Brook").unwrap();
        pump(&mut host, &mut guest);
        host.start_game("Ada").unwrap();
        pump(&mut host, &mut guest);
        host.submit_guess(1000).unwrap();
        guest.submit_guess(900).unwrap();
        pump(&mut host, &mut guest);

        host.check_guess_timeout(Instant::now() + Duration::from_secs(1));
        assert!(host.pending_guess.is_none());
        assert!(!host
            .events()
            .any(|e| matches!(e, GameEvent::PeerGuessOverdue { .. })));
    }

    #[test]
    fn resolved_guest_keeps_asking_until_the_host_moves_on() {
        let (mut host, mut guest) = networked_pair(|| {
            SessionBuilder::new()
                .with_catalog(fork_catalog())
                .with_total_rounds(2)
                .with_guess_timeout(Duration::from_millis(100))
        });
        guest.join_as_guest("Brook").unwrap();
        pump(&mut host, &mut guest);
        host.start_game("Ada").unwrap();
        pump(&mut host, &mut guest);
        guest.submit_guess(900).unwrap();
        host.submit_guess(1000).unwrap();
        pump(&mut host, &mut guest);
        assert_eq!(guest.state(), CoordinatorState::RoundResolved);
        let _ = guest.events().count();

        guest.check_guess_timeout(Instant::now() + Duration::from_millis(150));
        assert!(guest.pending_guess.is_some());
        assert!(matches!(
            guest.coordinator_mut().take_outbox().as_slice(),
            [Message::Guess { round_index: 1, role: Role::Guest, value: 900, .. }]
        ));
        // Waiting on the host to advance is not an overdue guess.
        assert_eq!(guest.events().count(), 0);

        host.advance_round().unwrap();
        pump(&mut host, &mut guest);
        guest.check_guess_timeout(Instant::now() + Duration::from_secs(1));
        assert!(guest.pending_guess.is_none());
    }

    #[test]
    fn disconnect_keeps_state() {
        let (mut host, mut guest) = joined_pair();
        host.start_game("Ada").unwrap();
        pump(&mut host, &mut guest);
        drop(guest);
        host.poll();
        assert_eq!(host.state(), CoordinatorState::RoundActive);
        assert!(host.events().any(|e| e == GameEvent::PeerDisconnected));
        assert!(!host.is_connected());
    }
}
