//! The round synchronization state machine.
//!
//! A [`RoundCoordinator`] owns the game and round state of one peer and
//! drives it through
//! `Idle → AwaitingPlayers → RoundActive → RoundResolved → (RoundActive | GameComplete)`.
//!
//! The coordinator never touches a transport. Messages for the peer are
//! queued in an outbox ([`RoundCoordinator::take_outbox`]) and incoming
//! messages are applied with [`RoundCoordinator::handle_message`]. Every
//! message is safe to apply more than once: each carries the host-assigned
//! game number and, where relevant, its round index, and anything stale is
//! dropped with a [`ViolationKind::RoundProtocol`] warning.
//!
//! Only the host (or a local, single-process coordinator) computes results.
//! A networked guest mirrors the host's results without recomputation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::catalog::{Catalog, InventionFact, ItemDeck};
use crate::error::{GameError, GameResult};
use crate::game_state::{
    GameState, GameSummary, PerRole, PlayerNames, Role, RoundResult, RoundState,
};
use crate::network::messages::Message;
use crate::rng::{Pcg32, SeedableRng};
use crate::sessions::config::SessionConfig;
use crate::sessions::event_drain::EventDrain;
use crate::telemetry::{
    InvariantChecker, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{debug_check_invariants, report_violation_to, GameEvent};

/// Lifecycle state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorState {
    /// No game in progress.
    Idle,
    /// Waiting for the second identity (host) or for the host to start (guest).
    AwaitingPlayers,
    /// Accepting guesses.
    RoundActive,
    /// Both guesses are in and the result is known; waiting for advance.
    RoundResolved,
    /// All rounds played.
    GameComplete,
}

impl CoordinatorState {
    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingPlayers => "awaiting players",
            Self::RoundActive => "round active",
            Self::RoundResolved => "round resolved",
            Self::GameComplete => "game complete",
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether one coordinator drives both roles or one side of a networked game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Both roles play on this coordinator; nothing is transmitted.
    Local,
    /// One role plays here, the other on a peer reached through a channel.
    Networked {
        /// The role played on this side.
        local_role: Role,
    },
}

/// What happened to a submitted guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuessOutcome {
    /// Stored; the round still waits for the other guess (or, on a guest, for the host's results).
    Recorded,
    /// Stored, and the round was resolved.
    Resolved,
    /// That role already guessed this round. Nothing changed.
    Duplicate,
    /// No round is accepting guesses from this caller.
    NotAccepting,
}

/// Result of [`RoundCoordinator::advance_round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvanceOutcome {
    /// A new round started.
    NextRound {
        /// The new round's index.
        round_index: u32,
    },
    /// The final round was already played.
    GameComplete {
        /// Strictly higher total, `None` on a tie.
        winner: Option<Role>,
    },
}

/// Round synchronization state machine for one peer.
///
/// ```
/// use year_duel::{Catalog, Mode, PerRole, RoundCoordinator, SessionConfig, GuessOutcome, Role};
///
/// let mut coordinator = RoundCoordinator::new(
///     Mode::Local,
///     Catalog::builtin(),
///     &SessionConfig::deterministic(7),
/// );
/// coordinator.start_game(PerRole::new("Ada".into(), "Brook".into()))?;
/// assert_eq!(coordinator.submit_guess(Role::Host, 1900), GuessOutcome::Recorded);
/// assert_eq!(coordinator.submit_guess(Role::Guest, -200), GuessOutcome::Resolved);
/// # Ok::<(), year_duel::GameError>(())
/// ```
pub struct RoundCoordinator {
    mode: Mode,
    state: CoordinatorState,
    catalog: Catalog,
    rng: Pcg32,
    total_rounds: u32,
    names: PlayerNames,
    guest_joined: bool,
    peer_connected: bool,
    game_number: u64,
    game: Option<GameState>,
    round: Option<RoundState>,
    outbox: VecDeque<Message>,
    events: VecDeque<GameEvent>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl RoundCoordinator {
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new(mode: Mode, catalog: Catalog, config: &SessionConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(Pcg32::from_entropy, Pcg32::seed_from_u64);
        Self {
            mode,
            state: CoordinatorState::Idle,
            catalog,
            rng,
            total_rounds: config.total_rounds,
            names: PlayerNames::default(),
            guest_joined: false,
            peer_connected: false,
            game_number: 0,
            game: None,
            round: None,
            outbox: VecDeque::new(),
            events: VecDeque::new(),
            violation_observer: None,
        }
    }

    /// Routes protocol violations to `observer` instead of the tracing fallback.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    // ##########
    // # Lobby  #
    // ##########

    /// Host (or local) side: opens a session and waits for the second player.
    ///
    /// # Errors
    /// [`GameError::InvalidRequest`] on a networked guest or when not idle.
    pub fn open_session(&mut self) -> GameResult<()> {
        if self.local_role() == Some(Role::Guest) {
            return Err(GameError::invalid_request(
                "a guest joins a session instead of opening one",
            ));
        }
        if self.state != CoordinatorState::Idle {
            return Err(GameError::invalid_request(format!(
                "cannot open a session while {}",
                self.state
            )));
        }
        self.state = CoordinatorState::AwaitingPlayers;
        info!(mode = ?self.mode, "session opened");
        Ok(())
    }

    /// Guest side: announces the guest to the host.
    ///
    /// # Errors
    /// [`GameError::MissingName`] for a blank name, [`GameError::InvalidRequest`]
    /// when not a networked guest or when a game is in progress.
    pub fn join_as_guest(&mut self, guest_name: &str) -> GameResult<()> {
        if self.local_role() != Some(Role::Guest) {
            return Err(GameError::invalid_request(
                "only a networked guest can join a session",
            ));
        }
        let name = guest_name.trim();
        if name.is_empty() {
            return Err(GameError::MissingName { role: Role::Guest });
        }
        if !matches!(
            self.state,
            CoordinatorState::Idle | CoordinatorState::AwaitingPlayers
        ) {
            return Err(GameError::invalid_request(format!(
                "cannot join while {}",
                self.state
            )));
        }
        self.names.guest = name.to_owned();
        self.state = CoordinatorState::AwaitingPlayers;
        info!(guest = name, "joining session");
        self.send(Message::GuestJoined {
            guest_name: name.to_owned(),
        });
        Ok(())
    }

    /// Host (or local) side: starts a new game with round 1.
    ///
    /// Allowed from `Idle`, `AwaitingPlayers` and `GameComplete`, so a rematch
    /// needs no new session.
    ///
    /// # Errors
    /// - [`GameError::InvalidRequest`] on a guest or while a game is running.
    /// - [`GameError::GuestNotJoined`] if no guest has announced itself (networked).
    /// - [`GameError::MissingName`] for a blank name.
    pub fn start_game(&mut self, names: PlayerNames) -> GameResult<()> {
        if self.local_role() == Some(Role::Guest) {
            return Err(GameError::invalid_request("only the host can start a game"));
        }
        if !matches!(
            self.state,
            CoordinatorState::Idle
                | CoordinatorState::AwaitingPlayers
                | CoordinatorState::GameComplete
        ) {
            return Err(GameError::invalid_request(format!(
                "cannot start a game while {}",
                self.state
            )));
        }
        if self.is_networked() && !self.guest_joined {
            return Err(GameError::GuestNotJoined);
        }
        for role in Role::ALL {
            if names[role].trim().is_empty() {
                return Err(GameError::MissingName { role });
            }
        }

        let mut game = GameState::new(self.total_rounds);
        let item = draw_item(&self.catalog, &mut self.rng, game.used_items_mut())?;
        self.names = names.map(|_, name| name.trim().to_owned());
        self.game_number += 1;
        self.game = Some(game);
        self.round = Some(RoundState::new(item.clone(), 1));
        self.state = CoordinatorState::RoundActive;
        info!(
            game = self.game_number,
            item = %item.name,
            total_rounds = self.total_rounds,
            "game started"
        );

        self.send(Message::GameStart {
            game: self.game_number,
            item: item.clone(),
            host_name: self.names.host.clone(),
            guest_name: self.names.guest.clone(),
            total_rounds: self.total_rounds,
        });
        self.emit(GameEvent::RoundStarted {
            round_index: 1,
            item,
        });
        debug_check_invariants!(self, "start_game");
        Ok(())
    }

    // ##########
    // # Rounds #
    // ##########

    /// Records a guess for `role` in the current round.
    ///
    /// Never fails. A second guess for the same role is a no-op
    /// ([`GuessOutcome::Duplicate`]). On a networked coordinator only the
    /// local role may submit here; the peer's guesses arrive as messages.
    pub fn submit_guess(&mut self, role: Role, value: i64) -> GuessOutcome {
        if let Mode::Networked { local_role } = self.mode {
            if role != local_role {
                report_violation_to!(
                    &self.violation_observer,
                    self.current_round_index(),
                    ViolationSeverity::Warning,
                    ViolationKind::InternalError,
                    "local submission for the remote {} role ignored",
                    role
                );
                return GuessOutcome::NotAccepting;
            }
        }

        let outcome = self.record_guess(role, value);
        if outcome != GuessOutcome::Recorded {
            return outcome;
        }
        self.send(Message::Guess {
            game: self.game_number,
            round_index: self.current_round_index(),
            role,
            value,
        });
        self.resolve_if_complete()
    }

    /// Scores the current round. Host and local only.
    ///
    /// # Errors
    /// [`GameError::IncompleteRound`] if a guess is missing; this is a
    /// contract violation and is also reported as a critical violation.
    pub(crate) fn resolve_round(&mut self) -> GameResult<RoundResult> {
        if !self.is_authoritative() {
            return Err(GameError::invalid_request("only the host resolves rounds"));
        }
        if self.state != CoordinatorState::RoundActive {
            return Err(GameError::invalid_request(format!(
                "cannot resolve a round while {}",
                self.state
            )));
        }
        let (Some(round), Some(game)) = (self.round.as_ref(), self.game.as_mut()) else {
            return Err(GameError::invalid_request("no round in progress"));
        };
        let round_index = round.round_index();
        if let Some(missing) = round.missing_role() {
            report_violation_to!(
                &self.violation_observer,
                round_index,
                ViolationSeverity::Critical,
                ViolationKind::InternalError,
                "round {} resolved without a {} guess",
                round_index,
                missing
            );
            return Err(GameError::IncompleteRound {
                round: round_index,
                missing,
            });
        }
        let result =
            RoundResult::compute(round, &self.names).ok_or(GameError::IncompleteRound {
                round: round_index,
                missing: Role::Host,
            })?;

        game.record_result(result.clone());
        let scores = game.scores();
        self.state = CoordinatorState::RoundResolved;
        info!(
            round = round_index,
            host_score = result.entries.host.score,
            guest_score = result.entries.guest.score,
            winner = ?result.round_winner(),
            "round resolved"
        );

        self.send(Message::Results {
            game: self.game_number,
            result: result.clone(),
            scores,
        });
        self.emit(GameEvent::RoundResolved {
            result: result.clone(),
            scores,
        });
        debug_check_invariants!(self, "resolve_round");
        Ok(result)
    }

    /// Host (or local) side: moves past a resolved round.
    ///
    /// Starts the next round, or completes the game when the resolved round
    /// was the last one. Never produces a round beyond the configured total.
    ///
    /// # Errors
    /// [`GameError::InvalidRequest`] on a networked guest or outside `RoundResolved`.
    pub fn advance_round(&mut self) -> GameResult<AdvanceOutcome> {
        if !self.is_authoritative() {
            return Err(GameError::invalid_request("only the host advances rounds"));
        }
        if self.state != CoordinatorState::RoundResolved {
            return Err(GameError::invalid_request(format!(
                "cannot advance while {}",
                self.state
            )));
        }
        let (Some(round), Some(game)) = (self.round.as_ref(), self.game.as_mut()) else {
            return Err(GameError::invalid_request("no game in progress"));
        };
        let Some(previous) = game.history().last().cloned() else {
            return Err(GameError::invalid_request("resolved round missing from history"));
        };
        let next = round.round_index() + 1;
        let scores = game.scores();

        if next > game.total_rounds() {
            let summary = game.summary();
            let winner = summary.winner;
            self.state = CoordinatorState::GameComplete;
            info!(?winner, host = scores.host, guest = scores.guest, "game complete");
            self.send(Message::GameOver {
                game: self.game_number,
                scores,
                last: previous,
            });
            self.emit(GameEvent::GameCompleted { summary });
            debug_check_invariants!(self, "advance_round/complete");
            return Ok(AdvanceOutcome::GameComplete { winner });
        }

        let item = draw_item(&self.catalog, &mut self.rng, game.used_items_mut())?;
        self.round = Some(RoundState::new(item.clone(), next));
        self.state = CoordinatorState::RoundActive;
        info!(round = next, item = %item.name, "round started");
        self.send(Message::NextRound {
            game: self.game_number,
            round_index: next,
            item: item.clone(),
            scores,
            previous,
        });
        self.emit(GameEvent::RoundStarted {
            round_index: next,
            item,
        });
        debug_check_invariants!(self, "advance_round");
        Ok(AdvanceOutcome::NextRound { round_index: next })
    }

    /// Discards the game and returns to `Idle`, telling the peer to do the same.
    ///
    /// Player names are kept so the host can start a rematch.
    pub fn reset_game(&mut self) {
        if self.state == CoordinatorState::Idle && self.game.is_none() {
            return;
        }
        let game = self.game_number;
        self.clear_game();
        self.send(Message::Reset { game });
    }

    /// Re-queues the local guess while the round is still waiting on the peer.
    ///
    /// Returns the round index if a guess was queued. Receivers treat the
    /// repeat as a duplicate; a host that already moved on answers it by
    /// repeating whatever the guest missed. A guest also repeats its guess
    /// from `RoundResolved`, which is how it recovers a lost `NextRound` or
    /// `GameOver`.
    pub fn resend_local_guess(&mut self) -> Option<u32> {
        let Mode::Networked { local_role } = self.mode else {
            return None;
        };
        let waiting = match local_role {
            Role::Host => self.state == CoordinatorState::RoundActive,
            Role::Guest => matches!(
                self.state,
                CoordinatorState::RoundActive | CoordinatorState::RoundResolved
            ),
        };
        if !waiting {
            return None;
        }
        let round = self.round.as_ref()?;
        let value = round.guess(local_role)?;
        let round_index = round.round_index();
        debug!(round = round_index, "re-sending local guess");
        self.send(Message::Guess {
            game: self.game_number,
            round_index,
            role: local_role,
            value,
        });
        Some(round_index)
    }

    // ##########
    // # Inbox  #
    // ##########

    /// Applies a message from the peer.
    ///
    /// Stale, duplicate or unexpected messages are ignored and reported as
    /// [`ViolationKind::RoundProtocol`] warnings.
    pub fn handle_message(&mut self, message: Message) {
        let Mode::Networked { local_role } = self.mode else {
            report_violation_to!(
                &self.violation_observer,
                self.current_round_index(),
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "{} message received by a local coordinator",
                message.kind()
            );
            return;
        };
        trace!(kind = message.kind(), game = ?message.game(), "message received");

        match (local_role, message) {
            (Role::Host, Message::GuestJoined { guest_name }) => self.on_guest_joined(&guest_name),
            (
                Role::Guest,
                Message::GameStart {
                    game,
                    item,
                    host_name,
                    guest_name,
                    total_rounds,
                },
            ) => self.on_game_start(game, item, PerRole::new(host_name, guest_name), total_rounds),
            (
                _,
                Message::Guess {
                    game,
                    round_index,
                    role,
                    value,
                },
            ) => self.on_peer_guess(local_role, game, round_index, role, value),
            (Role::Guest, Message::Results { game, result, scores }) => {
                self.on_results(game, result, scores);
            },
            (
                Role::Guest,
                Message::NextRound {
                    game,
                    round_index,
                    item,
                    scores,
                    previous,
                },
            ) => self.on_next_round(game, round_index, item, scores, previous),
            (Role::Guest, Message::GameOver { game, scores, last }) => {
                self.on_game_over(game, scores, last);
            },
            (_, Message::Reset { game }) => self.on_reset(game),
            (role, other) => {
                report_violation_to!(
                    &self.violation_observer,
                    self.current_round_index(),
                    ViolationSeverity::Warning,
                    ViolationKind::RoundProtocol,
                    "{} message is not expected by the {}",
                    other.kind(),
                    role
                );
            },
        }
        debug_check_invariants!(self, "handle_message");
    }

    /// The channel reports a connected peer.
    pub fn handle_peer_connected(&mut self) {
        self.peer_connected = true;
        info!("peer connected");
        self.emit(GameEvent::PeerConnected);
        // Anything sent before the connection existed was dropped
        if self.local_role() == Some(Role::Guest)
            && self.state == CoordinatorState::AwaitingPlayers
            && !self.names.guest.is_empty()
        {
            let guest_name = self.names.guest.clone();
            self.send(Message::GuestJoined { guest_name });
        }
    }

    /// The channel reports the peer gone. Game state is left untouched.
    pub fn handle_peer_disconnected(&mut self) {
        self.peer_connected = false;
        warn!(state = %self.state, "peer disconnected");
        self.emit(GameEvent::PeerDisconnected);
    }

    fn on_guest_joined(&mut self, guest_name: &str) {
        let name = guest_name.trim();
        if name.is_empty() {
            report_violation_to!(
                &self.violation_observer,
                self.current_round_index(),
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "guestJoined without a name ignored"
            );
            return;
        }
        match self.state {
            CoordinatorState::Idle
            | CoordinatorState::AwaitingPlayers
            | CoordinatorState::GameComplete => {
                if self.guest_joined && self.names.guest == name {
                    debug!(guest = name, "repeated guestJoined");
                    return;
                }
                self.guest_joined = true;
                self.names.guest = name.to_owned();
                if self.state == CoordinatorState::Idle {
                    self.state = CoordinatorState::AwaitingPlayers;
                }
                info!(guest = name, "guest joined");
                self.emit(GameEvent::GuestJoined {
                    guest_name: name.to_owned(),
                });
            },
            CoordinatorState::RoundActive | CoordinatorState::RoundResolved => {
                if name == self.names.guest && self.resend_game_start() {
                    return;
                }
                report_violation_to!(
                    &self.violation_observer,
                    self.current_round_index(),
                    ViolationSeverity::Warning,
                    ViolationKind::RoundProtocol,
                    "guestJoined from '{}' ignored during a game",
                    name
                );
            },
        }
    }

    /// Host side: the guest announced itself again during round 1, so it
    /// never saw the `GameStart`. Returns whether one was queued.
    fn resend_game_start(&mut self) -> bool {
        let Some(round) = self.round.as_ref() else {
            return false;
        };
        let unplayed = self.game.as_ref().is_some_and(|game| game.history().is_empty());
        if self.state != CoordinatorState::RoundActive || round.round_index() != 1 || !unplayed {
            return false;
        }
        debug!(game = self.game_number, "repeating gameStart for a guest that missed it");
        let message = Message::GameStart {
            game: self.game_number,
            item: round.item().clone(),
            host_name: self.names.host.clone(),
            guest_name: self.names.guest.clone(),
            total_rounds: self.total_rounds,
        };
        self.send(message);
        true
    }

    fn on_game_start(
        &mut self,
        game: u64,
        item: InventionFact,
        names: PlayerNames,
        total_rounds: u32,
    ) {
        if game <= self.game_number {
            self.stale("gameStart", game);
            return;
        }
        if total_rounds == 0 {
            report_violation_to!(
                &self.violation_observer,
                0,
                ViolationSeverity::Error,
                ViolationKind::RoundProtocol,
                "gameStart for game {} with zero rounds ignored",
                game
            );
            return;
        }
        self.game_number = game;
        self.names = names;
        self.total_rounds = total_rounds;
        self.game = Some(GameState::new(total_rounds));
        self.round = Some(RoundState::new(item.clone(), 1));
        self.state = CoordinatorState::RoundActive;
        info!(game, item = %item.name, total_rounds, "game started by host");
        self.emit(GameEvent::RoundStarted {
            round_index: 1,
            item,
        });
    }

    fn on_peer_guess(&mut self, local_role: Role, game: u64, round_index: u32, role: Role, value: i64) {
        if role == local_role {
            report_violation_to!(
                &self.violation_observer,
                round_index,
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "peer sent a guess for the local {} role",
                role
            );
            return;
        }
        if game != self.game_number {
            if !self.is_authoritative() && game > self.game_number {
                self.request_game_start(game);
            } else {
                self.stale("guess", game);
            }
            return;
        }

        if self.state == CoordinatorState::RoundActive && round_index == self.current_round_index() {
            match self.record_guess(role, value) {
                GuessOutcome::Recorded => {
                    if self.is_authoritative() {
                        self.resolve_if_complete();
                    }
                },
                GuessOutcome::Duplicate => {
                    report_violation_to!(
                        &self.violation_observer,
                        round_index,
                        ViolationSeverity::Warning,
                        ViolationKind::RoundProtocol,
                        "duplicate {} guess ignored",
                        role
                    );
                },
                GuessOutcome::Resolved | GuessOutcome::NotAccepting => {},
            }
            return;
        }

        if self.is_authoritative() {
            self.resend_progress(round_index);
        } else if round_index > self.current_round_index() && self.resend_local_guess().is_some() {
            // The host is ahead, so it answers our repeated guess with
            // whatever we missed.
            debug!(round_index, "host is ahead, prompting it to repeat");
        } else {
            report_violation_to!(
                &self.violation_observer,
                self.current_round_index(),
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "host guess for round {} ignored while {}",
                round_index,
                self.state
            );
        }
    }

    /// Guest side: the host is playing a game we never saw start. Announcing
    /// ourselves again makes it repeat the `GameStart`.
    fn request_game_start(&mut self, game: u64) {
        if self.names.guest.is_empty() {
            self.stale("guess", game);
            return;
        }
        debug!(game, current = self.game_number, "missed gameStart, announcing again");
        let guest_name = self.names.guest.clone();
        self.send(Message::GuestJoined { guest_name });
    }

    /// Host side: the guest guessed for a round we already moved past, so
    /// repeat the message it evidently missed.
    fn resend_progress(&mut self, peer_round: u32) {
        let current = self.current_round_index();
        let (Some(game), Some(round)) = (self.game.as_ref(), self.round.as_ref()) else {
            self.stale("guess", self.game_number);
            return;
        };
        let scores = game.scores();
        let last = game.history().last().cloned();
        let message = match (self.state, last) {
            (CoordinatorState::RoundResolved, Some(result)) if peer_round == current => {
                Message::Results {
                    game: self.game_number,
                    result,
                    scores,
                }
            },
            (CoordinatorState::RoundActive, Some(previous))
                if current.checked_sub(1) == Some(peer_round) => {
                Message::NextRound {
                    game: self.game_number,
                    round_index: current,
                    item: round.item().clone(),
                    scores,
                    previous,
                }
            },
            (CoordinatorState::GameComplete, Some(last)) if peer_round == current => {
                Message::GameOver {
                    game: self.game_number,
                    scores,
                    last,
                }
            },
            _ => {
                report_violation_to!(
                    &self.violation_observer,
                    current,
                    ViolationSeverity::Warning,
                    ViolationKind::RoundProtocol,
                    "guess for round {} ignored while {} on round {}",
                    peer_round,
                    self.state,
                    current
                );
                return;
            },
        };
        debug!(
            kind = message.kind(),
            peer_round, "repeating progress for a peer that fell behind"
        );
        self.send(message);
    }

    fn on_results(&mut self, game: u64, result: RoundResult, scores: PerRole<u64>) {
        if game != self.game_number {
            self.stale("results", game);
            return;
        }
        let current = self.current_round_index();
        if self.state == CoordinatorState::RoundResolved && result.round_index == current {
            debug!(round = current, "repeated results");
            return;
        }
        if self.state != CoordinatorState::RoundActive || result.round_index != current {
            report_violation_to!(
                &self.violation_observer,
                current,
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "results for round {} ignored while {} on round {}",
                result.round_index,
                self.state,
                current
            );
            return;
        }
        if self.mirror_result(result, scores) {
            self.state = CoordinatorState::RoundResolved;
        }
    }

    fn on_next_round(
        &mut self,
        game: u64,
        round_index: u32,
        item: InventionFact,
        scores: PerRole<u64>,
        previous: RoundResult,
    ) {
        if game != self.game_number {
            self.stale("nextRound", game);
            return;
        }
        let current = self.current_round_index();
        if round_index <= current
            || round_index > self.total_rounds
            || !matches!(
                self.state,
                CoordinatorState::RoundActive | CoordinatorState::RoundResolved
            )
        {
            report_violation_to!(
                &self.violation_observer,
                current,
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "nextRound for round {} ignored while {} on round {}",
                round_index,
                self.state,
                current
            );
            return;
        }

        self.mirror_result(previous, scores);
        self.round = Some(RoundState::new(item.clone(), round_index));
        self.state = CoordinatorState::RoundActive;
        info!(round = round_index, item = %item.name, "round started by host");
        self.emit(GameEvent::RoundStarted { round_index, item });
    }

    fn on_game_over(&mut self, game: u64, scores: PerRole<u64>, last: RoundResult) {
        if game != self.game_number {
            self.stale("gameOver", game);
            return;
        }
        if !matches!(
            self.state,
            CoordinatorState::RoundActive | CoordinatorState::RoundResolved
        ) {
            report_violation_to!(
                &self.violation_observer,
                self.current_round_index(),
                ViolationSeverity::Warning,
                ViolationKind::RoundProtocol,
                "gameOver ignored while {}",
                self.state
            );
            return;
        }

        self.mirror_result(last, scores);
        let Some(summary) = self.game.as_ref().map(GameState::summary) else {
            return;
        };
        self.state = CoordinatorState::GameComplete;
        info!(winner = ?summary.winner, "game complete");
        self.emit(GameEvent::GameCompleted { summary });
    }

    fn on_reset(&mut self, game: u64) {
        if game != self.game_number {
            self.stale("reset", game);
            return;
        }
        if self.game.is_none() {
            debug!(game, state = %self.state, "reset without a game ignored");
            return;
        }
        self.clear_game();
    }

    // ##########
    // # Access #
    // ##########

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// The round in progress (or the last one played).
    #[must_use]
    pub fn round(&self) -> Option<&RoundState> {
        self.round.as_ref()
    }

    /// The current game, if one has started.
    #[must_use]
    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    /// Host-assigned game number; 0 before the first game.
    #[must_use]
    pub fn game_number(&self) -> u64 {
        self.game_number
    }

    /// Known player names; empty until set.
    #[must_use]
    pub fn names(&self) -> &PlayerNames {
        &self.names
    }

    /// Scores, winner and history of the current game.
    #[must_use]
    pub fn summary(&self) -> Option<GameSummary> {
        self.game.as_ref().map(GameState::summary)
    }

    /// The locally played role, `None` in local mode.
    #[must_use]
    pub fn local_role(&self) -> Option<Role> {
        match self.mode {
            Mode::Local => None,
            Mode::Networked { local_role } => Some(local_role),
        }
    }

    /// Local or networked.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Rounds per game for the next (or current) game.
    #[must_use]
    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Host side: whether a guest has announced itself.
    #[must_use]
    pub fn guest_joined(&self) -> bool {
        self.guest_joined
    }

    /// Whether the channel last reported the peer as connected.
    #[must_use]
    pub fn is_peer_connected(&self) -> bool {
        self.peer_connected
    }

    /// Takes every queued outbound message, oldest first.
    pub fn take_outbox(&mut self) -> Vec<Message> {
        self.outbox.drain(..).collect()
    }

    /// Drains pending events, oldest first.
    pub fn drain_events(&mut self) -> EventDrain<'_> {
        EventDrain::from_drain(self.events.drain(..))
    }

    pub(crate) fn push_event(&mut self, event: GameEvent) {
        self.events.push_back(event);
    }

    // ##########
    // # Helper #
    // ##########

    fn is_networked(&self) -> bool {
        matches!(self.mode, Mode::Networked { .. })
    }

    fn is_authoritative(&self) -> bool {
        self.local_role() != Some(Role::Guest)
    }

    fn current_round_index(&self) -> u32 {
        self.round.as_ref().map_or(0, RoundState::round_index)
    }

    fn send(&mut self, message: Message) {
        if self.is_networked() {
            trace!(kind = message.kind(), "message queued");
            self.outbox.push_back(message);
        }
    }

    fn emit(&mut self, event: GameEvent) {
        self.events.push_back(event);
    }

    fn record_guess(&mut self, role: Role, value: i64) -> GuessOutcome {
        if self.state != CoordinatorState::RoundActive {
            debug!(%role, state = %self.state, "guess not accepted");
            return GuessOutcome::NotAccepting;
        }
        let Some(round) = self.round.as_mut() else {
            return GuessOutcome::NotAccepting;
        };
        if !round.record_guess(role, value) {
            debug!(%role, round = round.round_index(), "duplicate guess");
            return GuessOutcome::Duplicate;
        }
        let round_index = round.round_index();
        debug!(%role, round = round_index, "guess recorded");
        self.emit(GameEvent::GuessRecorded { role, round_index });
        GuessOutcome::Recorded
    }

    fn resolve_if_complete(&mut self) -> GuessOutcome {
        let complete = self.round.as_ref().is_some_and(RoundState::is_complete);
        if complete && self.is_authoritative() && self.resolve_round().is_ok() {
            GuessOutcome::Resolved
        } else {
            GuessOutcome::Recorded
        }
    }

    /// Guest side: adopts a host result unless it is already mirrored.
    fn mirror_result(&mut self, result: RoundResult, scores: PerRole<u64>) -> bool {
        let Some(game) = self.game.as_mut() else {
            return false;
        };
        if !game.adopt_result(result.clone(), scores) {
            game.adopt_scores(scores);
            return false;
        }
        debug!(round = result.round_index, "result mirrored");
        self.events
            .push_back(GameEvent::RoundResolved { result, scores });
        true
    }

    fn clear_game(&mut self) {
        self.game = None;
        self.round = None;
        self.state = CoordinatorState::Idle;
        info!(game = self.game_number, "game reset");
        self.emit(GameEvent::GameReset);
    }

    fn stale(&self, kind: &str, game: u64) {
        report_violation_to!(
            &self.violation_observer,
            self.current_round_index(),
            ViolationSeverity::Warning,
            ViolationKind::RoundProtocol,
            "{} for game {} ignored (current game {})",
            kind,
            game,
            self.game_number
        );
    }
}

fn draw_item(catalog: &Catalog, rng: &mut Pcg32, deck: &mut ItemDeck) -> GameResult<InventionFact> {
    let id = deck.draw(catalog, rng);
    catalog
        .get(id)
        .cloned()
        .ok_or_else(|| GameError::invalid_request(format!("drawn item {:?} is not in the catalog", id)))
}

impl InvariantChecker for RoundCoordinator {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if let Some(round) = &self.round {
            round.check_invariants()?;
        }
        if let Some(game) = &self.game {
            game.check_invariants()?;
        }
        match self.state {
            CoordinatorState::Idle => {
                if self.game.is_some() {
                    return Err(InvariantViolation::new(
                        "RoundCoordinator",
                        "idle coordinator still holds a game",
                    ));
                }
            },
            CoordinatorState::AwaitingPlayers => {},
            CoordinatorState::RoundActive | CoordinatorState::RoundResolved => {
                let (Some(round), Some(game)) = (&self.round, &self.game) else {
                    return Err(InvariantViolation::new(
                        "RoundCoordinator",
                        "round state without a round or game",
                    ));
                };
                if round.round_index() > game.total_rounds() {
                    return Err(InvariantViolation::new(
                        "RoundCoordinator",
                        "round index beyond the configured total",
                    )
                    .with_details(format!(
                        "round={}, total={}",
                        round.round_index(),
                        game.total_rounds()
                    )));
                }
                // A guest mirror may have gaps after lost messages
                if self.is_authoritative() {
                    let resolved = u32::from(self.state == CoordinatorState::RoundResolved);
                    let expected = round.round_index() - 1 + resolved;
                    if game.history().len() != expected as usize {
                        return Err(InvariantViolation::new(
                            "RoundCoordinator",
                            "history length does not match the round index",
                        )
                        .with_details(format!(
                            "history={}, round={}, state={}",
                            game.history().len(),
                            round.round_index(),
                            self.state
                        )));
                    }
                }
            },
            CoordinatorState::GameComplete => {
                if let (true, Some(game)) = (self.is_authoritative(), &self.game) {
                    if game.history().len() != game.total_rounds() as usize {
                        return Err(InvariantViolation::new(
                            "RoundCoordinator",
                            "completed game is missing rounds",
                        ));
                    }
                }
            },
        }
        Ok(())
    }
}

impl fmt::Debug for RoundCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            mode,
            state,
            catalog,
            rng: _,
            total_rounds,
            names,
            guest_joined,
            peer_connected,
            game_number,
            game,
            round,
            outbox,
            events,
            violation_observer,
        } = self;
        f.debug_struct("RoundCoordinator")
            .field("mode", mode)
            .field("state", state)
            .field("catalog_len", &catalog.len())
            .field("total_rounds", total_rounds)
            .field("names", names)
            .field("guest_joined", guest_joined)
            .field("peer_connected", peer_connected)
            .field("game_number", game_number)
            .field("game", game)
            .field("round", round)
            .field("outbox_len", &outbox.len())
            .field("events_len", &events.len())
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
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
    use crate::telemetry::CollectingObserver;

    fn fork_catalog() -> Catalog {
        Catalog::new(vec![InventionFact::new("Fork", 1000, "fact")]).unwrap()
    }

    fn names() -> PlayerNames {
        PerRole::new("Ada".to_owned(), "Brook".to_owned())
    }

    fn config(rounds: u32) -> SessionConfig {
        SessionConfig {
            total_rounds: rounds,
            seed: Some(11),
            ..SessionConfig::default()
        }
    }

    fn local(rounds: u32) -> RoundCoordinator {
        RoundCoordinator::new(Mode::Local, fork_catalog(), &config(rounds))
    }

    struct Pair {
        host: RoundCoordinator,
        guest: RoundCoordinator,
        observer: Arc<CollectingObserver>,
    }

    impl Pair {
        fn new(rounds: u32) -> Self {
            let observer = Arc::new(CollectingObserver::new());
            let host = RoundCoordinator::new(
                Mode::Networked {
                    local_role: Role::Host,
                },
                fork_catalog(),
                &config(rounds),
            )
            .with_violation_observer(observer.clone());
            let guest = RoundCoordinator::new(
                Mode::Networked {
                    local_role: Role::Guest,
                },
                fork_catalog(),
                &config(rounds),
            )
            .with_violation_observer(observer.clone());
            Self {
                host,
                guest,
                observer,
            }
        }

        fn host_to_guest(&mut self) -> Vec<Message> {
            let messages = self.host.take_outbox();
            for message in messages.clone() {
                self.guest.handle_message(message);
            }
            messages
        }

        fn guest_to_host(&mut self) -> Vec<Message> {
            let messages = self.guest.take_outbox();
            for message in messages.clone() {
                self.host.handle_message(message);
            }
            messages
        }

        fn started(rounds: u32) -> Self {
            let mut pair = Self::new(rounds);
            pair.host.open_session().unwrap();
            pair.guest.join_as_guest("Brook").unwrap();
            pair.guest_to_host();
            pair.host
                .start_game(PerRole::new("Ada".to_owned(), "Brook".to_owned()))
                .unwrap();
            pair.host_to_guest();
            pair
        }

        fn play_round(&mut self, host_guess: i64, guest_guess: i64) {
            self.host.submit_guess(Role::Host, host_guess);
            self.guest.submit_guess(Role::Guest, guest_guess);
            self.host_to_guest();
            self.guest_to_host();
            self.host_to_guest();
        }
    }

    #[test]
    fn local_fork_round_scores_and_winner() {
        let mut coordinator = local(5);
        coordinator.start_game(names()).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::RoundActive);
        assert_eq!(
            coordinator.submit_guess(Role::Host, 1200),
            GuessOutcome::Recorded
        );
        assert_eq!(
            coordinator.submit_guess(Role::Guest, 500),
            GuessOutcome::Resolved
        );
        assert_eq!(coordinator.state(), CoordinatorState::RoundResolved);

        let game = coordinator.game().unwrap();
        assert_eq!(game.scores(), PerRole::new(300, 200));
        assert_eq!(game.history()[0].round_winner(), Some(Role::Host));
        assert!(coordinator.take_outbox().is_empty());
    }

    #[test]
    fn duplicate_guess_is_a_no_op() {
        let mut coordinator = local(5);
        coordinator.start_game(names()).unwrap();
        coordinator.submit_guess(Role::Host, 1200);
        let before = coordinator.round().cloned();
        assert_eq!(
            coordinator.submit_guess(Role::Host, 1),
            GuessOutcome::Duplicate
        );
        assert_eq!(coordinator.round().cloned(), before);
    }

    #[test]
    fn guesses_outside_a_round_are_not_accepted() {
        let mut coordinator = local(5);
        assert_eq!(
            coordinator.submit_guess(Role::Host, 1),
            GuessOutcome::NotAccepting
        );
        coordinator.start_game(names()).unwrap();
        coordinator.submit_guess(Role::Host, 1000);
        coordinator.submit_guess(Role::Guest, 1000);
        assert_eq!(
            coordinator.submit_guess(Role::Guest, 7),
            GuessOutcome::NotAccepting
        );
    }

    #[test]
    fn resolving_with_a_missing_guess_is_a_contract_violation() {
        let observer = Arc::new(CollectingObserver::new());
        let mut coordinator = local(5).with_violation_observer(observer.clone());
        coordinator.start_game(names()).unwrap();
        coordinator.submit_guess(Role::Host, 1200);

        let err = coordinator.resolve_round().unwrap_err();
        assert_eq!(
            err,
            GameError::IncompleteRound {
                round: 1,
                missing: Role::Guest
            }
        );
        assert!(err.is_contract_violation());
        assert!(observer.has_severity(ViolationSeverity::Critical));
        assert_eq!(coordinator.state(), CoordinatorState::RoundActive);
    }

    #[test]
    fn advance_on_last_round_completes_the_game() {
        let mut coordinator = local(2);
        coordinator.start_game(names()).unwrap();
        coordinator.submit_guess(Role::Host, 1000);
        coordinator.submit_guess(Role::Guest, 900);
        assert_eq!(
            coordinator.advance_round().unwrap(),
            AdvanceOutcome::NextRound { round_index: 2 }
        );
        coordinator.submit_guess(Role::Host, 1000);
        coordinator.submit_guess(Role::Guest, 900);
        assert_eq!(
            coordinator.advance_round().unwrap(),
            AdvanceOutcome::GameComplete {
                winner: Some(Role::Host)
            }
        );
        assert_eq!(coordinator.state(), CoordinatorState::GameComplete);
        assert_eq!(coordinator.round().unwrap().round_index(), 2);
        assert!(coordinator.advance_round().is_err());
    }

    #[test]
    fn tied_game_has_no_winner() {
        let mut coordinator = local(5);
        coordinator.start_game(names()).unwrap();
        for _ in 0..5 {
            coordinator.submit_guess(Role::Host, 900);
            coordinator.submit_guess(Role::Guest, 1100);
            coordinator.advance_round().unwrap();
        }
        let summary = coordinator.summary().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::GameComplete);
        assert_eq!(summary.winner, None);
        assert_eq!(summary.history.len(), 5);
        assert!(summary.history.iter().all(|r| r.round_winner().is_none()));
    }

    #[test]
    fn advance_before_resolution_is_rejected() {
        let mut coordinator = local(5);
        coordinator.start_game(names()).unwrap();
        assert!(matches!(
            coordinator.advance_round(),
            Err(GameError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut coordinator = local(5);
        let err = coordinator
            .start_game(PerRole::new("Ada".to_owned(), "  ".to_owned()))
            .unwrap_err();
        assert_eq!(err, GameError::MissingName { role: Role::Guest });
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn reset_then_rematch() {
        let mut coordinator = local(1);
        coordinator.start_game(names()).unwrap();
        coordinator.submit_guess(Role::Host, 1000);
        coordinator.submit_guess(Role::Guest, 1000);
        coordinator.advance_round().unwrap();
        coordinator.reset_game();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert!(coordinator.game().is_none());
        coordinator.start_game(names()).unwrap();
        assert_eq!(coordinator.game_number(), 2);
        assert_eq!(coordinator.game().unwrap().scores(), PerRole::new(0, 0));
    }

    #[test]
    fn networked_host_needs_a_guest() {
        let mut pair = Pair::new(5);
        pair.host.open_session().unwrap();
        assert_eq!(pair.host.start_game(names()), Err(GameError::GuestNotJoined));
    }

    #[test]
    fn guest_cannot_drive_the_game() {
        let mut pair = Pair::new(5);
        assert!(pair.guest.open_session().is_err());
        assert!(matches!(
            pair.guest.start_game(names()),
            Err(GameError::InvalidRequest { .. })
        ));
        assert!(pair.guest.advance_round().is_err());
        assert_eq!(
            pair.guest.join_as_guest(" "),
            Err(GameError::MissingName { role: Role::Guest })
        );
    }

    #[test]
    fn networked_round_mirrors_host_results() {
        let mut pair = Pair::started(5);
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);
        assert_eq!(pair.guest.names(), &names());

        pair.play_round(1200, 500);
        assert_eq!(pair.host.state(), CoordinatorState::RoundResolved);
        assert_eq!(pair.guest.state(), CoordinatorState::RoundResolved);
        assert_eq!(pair.guest.summary(), pair.host.summary());
        assert_eq!(
            pair.guest.game().unwrap().scores(),
            PerRole::new(300, 200)
        );
        assert!(pair.observer.is_empty(), "{:?}", pair.observer.violations());
    }

    #[test]
    fn redelivered_guess_resolves_exactly_once() {
        let mut pair = Pair::started(5);
        pair.host.submit_guess(Role::Host, 1200);
        pair.guest.submit_guess(Role::Guest, 500);
        let guesses = pair.guest.take_outbox();
        for _ in 0..3 {
            for message in guesses.clone() {
                pair.host.handle_message(message);
            }
        }
        let resolutions = pair
            .host
            .drain_events()
            .filter(|e| matches!(e, GameEvent::RoundResolved { .. }))
            .count();
        assert_eq!(resolutions, 1);
        assert_eq!(pair.host.game().unwrap().history().len(), 1);
        // Last delivery arrived after resolution and was answered with the results again
        let repeats = pair
            .host
            .take_outbox()
            .into_iter()
            .filter(|m| matches!(m, Message::Results { .. }))
            .count();
        assert_eq!(repeats, 3);
    }

    #[test]
    fn redelivered_host_messages_are_harmless() {
        let mut pair = Pair::started(3);
        pair.host.submit_guess(Role::Host, 1000);
        pair.guest.submit_guess(Role::Guest, 1000);
        pair.guest_to_host();
        let results = pair.host.take_outbox();
        for message in results.iter().chain(results.iter()).cloned() {
            pair.guest.handle_message(message);
        }
        assert_eq!(pair.guest.game().unwrap().history().len(), 1);
        assert_eq!(pair.guest.game().unwrap().scores(), PerRole::new(1000, 1000));
        assert!(pair.observer.has_violation(ViolationKind::RoundProtocol));
    }

    #[test]
    fn lost_results_are_recovered_from_next_round() {
        let mut pair = Pair::started(3);
        pair.host.submit_guess(Role::Host, 1100);
        pair.guest.submit_guess(Role::Guest, 1000);
        pair.guest_to_host();
        let _lost = pair.host.take_outbox();
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);

        pair.host.advance_round().unwrap();
        pair.host_to_guest();
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);
        assert_eq!(pair.guest.round().unwrap().round_index(), 2);
        assert_eq!(pair.guest.summary(), pair.host.summary());
    }

    #[test]
    fn stuck_guest_is_answered_after_a_resend() {
        let mut pair = Pair::started(3);
        pair.host.submit_guess(Role::Host, 1100);
        pair.guest.submit_guess(Role::Guest, 1000);
        pair.guest_to_host();
        let _lost = pair.host.take_outbox();

        assert_eq!(pair.guest.resend_local_guess(), Some(1));
        pair.guest_to_host();
        pair.host_to_guest();
        assert_eq!(pair.guest.state(), CoordinatorState::RoundResolved);
        assert_eq!(pair.guest.summary(), pair.host.summary());
    }

    #[test]
    fn guest_reaches_game_complete_through_game_over() {
        let mut pair = Pair::started(2);
        pair.play_round(1000, 0);
        pair.host.advance_round().unwrap();
        pair.host_to_guest();
        pair.play_round(0, 1000);
        pair.host.advance_round().unwrap();
        pair.host_to_guest();

        assert_eq!(pair.guest.state(), CoordinatorState::GameComplete);
        let summary = pair.guest.summary().unwrap();
        assert_eq!(summary, pair.host.summary().unwrap());
        assert_eq!(summary.winner, None);
    }

    #[test]
    fn stale_game_messages_are_ignored() {
        let mut pair = Pair::started(3);
        pair.guest.handle_message(Message::Guess {
            game: 0,
            round_index: 1,
            role: Role::Host,
            value: 1,
        });
        assert_eq!(pair.guest.round().unwrap().guess(Role::Host), None);
        assert!(pair.guest.take_outbox().is_empty());
        assert!(pair.observer.has_violation(ViolationKind::RoundProtocol));
    }

    #[test]
    fn lost_game_start_is_repeated_when_the_guest_announces_again() {
        let mut pair = Pair::new(3);
        pair.host.open_session().unwrap();
        pair.guest.join_as_guest("Brook").unwrap();
        pair.guest_to_host();
        pair.host.start_game(names()).unwrap();
        let _lost = pair.host.take_outbox();

        // The host's guess is for a game the guest never saw start.
        pair.host.submit_guess(Role::Host, 1100);
        pair.host_to_guest();
        assert_eq!(pair.guest.state(), CoordinatorState::AwaitingPlayers);
        let replies = pair.guest_to_host();
        assert!(matches!(replies.as_slice(), [Message::GuestJoined { .. }]));

        let repeated = pair.host_to_guest();
        assert!(matches!(repeated.as_slice(), [Message::GameStart { game: 1, .. }]));
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);
        assert_eq!(pair.guest.game_number(), 1);

        pair.guest.submit_guess(Role::Guest, 1000);
        pair.guest_to_host();
        pair.host_to_guest();
        assert_eq!(pair.guest.state(), CoordinatorState::RoundResolved);
        assert_eq!(pair.guest.summary(), pair.host.summary());
    }

    #[test]
    fn guest_joined_mid_game_from_a_stranger_is_ignored() {
        let mut pair = Pair::started(3);
        pair.host.handle_message(Message::GuestJoined {
            guest_name: "Mallory".to_owned(),
        });
        assert!(pair.host.take_outbox().is_empty());
        assert_eq!(pair.host.names().guest, "Brook");
        assert!(pair.observer.has_violation(ViolationKind::RoundProtocol));
    }

    #[test]
    fn lost_next_round_is_answered_from_a_resolved_guest() {
        let mut pair = Pair::started(3);
        pair.play_round(1000, 900);
        assert_eq!(pair.guest.state(), CoordinatorState::RoundResolved);
        pair.host.advance_round().unwrap();
        let _lost = pair.host.take_outbox();

        assert_eq!(pair.guest.resend_local_guess(), Some(1));
        pair.guest_to_host();
        pair.host_to_guest();
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);
        assert_eq!(pair.guest.round().unwrap().round_index(), 2);
    }

    #[test]
    fn host_guess_for_a_later_round_prompts_the_guest() {
        let mut pair = Pair::started(3);
        pair.play_round(1000, 900);
        pair.host.advance_round().unwrap();
        let _lost = pair.host.take_outbox();

        pair.host.submit_guess(Role::Host, 1500);
        pair.host_to_guest();
        assert!(matches!(
            pair.guest_to_host().as_slice(),
            [Message::Guess { round_index: 1, role: Role::Guest, .. }]
        ));
        pair.host_to_guest();
        let round = pair.guest.round().unwrap();
        assert_eq!(round.round_index(), 2);
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);
    }

    #[test]
    fn lost_game_over_is_answered_from_a_resolved_guest() {
        let mut pair = Pair::started(1);
        pair.play_round(1000, 900);
        assert_eq!(
            pair.host.advance_round().unwrap(),
            AdvanceOutcome::GameComplete {
                winner: Some(Role::Host)
            }
        );
        let _lost = pair.host.take_outbox();

        assert_eq!(pair.guest.resend_local_guess(), Some(1));
        pair.guest_to_host();
        pair.host_to_guest();
        assert_eq!(pair.guest.state(), CoordinatorState::GameComplete);
        assert_eq!(pair.guest.summary(), pair.host.summary());
    }

    #[test]
    fn host_does_not_repeat_from_resolved() {
        let mut pair = Pair::started(3);
        pair.play_round(1000, 900);
        assert_eq!(pair.host.state(), CoordinatorState::RoundResolved);
        assert_eq!(pair.host.resend_local_guess(), None);
    }

    #[test]
    fn reset_before_any_game_keeps_the_host_waiting() {
        let mut pair = Pair::new(3);
        pair.host.open_session().unwrap();
        pair.guest.join_as_guest("Brook").unwrap();
        pair.guest_to_host();

        pair.host.handle_message(Message::Reset { game: 0 });
        assert_eq!(pair.host.state(), CoordinatorState::AwaitingPlayers);
        assert!(pair.host.guest_joined());
        pair.host.start_game(names()).unwrap();
    }

    #[test]
    fn reset_propagates_and_rematch_reaches_the_guest() {
        let mut pair = Pair::started(3);
        pair.play_round(1000, 1000);
        pair.guest.reset_game();
        pair.guest_to_host();
        assert_eq!(pair.host.state(), CoordinatorState::Idle);
        assert_eq!(pair.guest.state(), CoordinatorState::Idle);

        pair.host.start_game(names()).unwrap();
        pair.host_to_guest();
        assert_eq!(pair.guest.game_number(), 2);
        assert_eq!(pair.guest.state(), CoordinatorState::RoundActive);
        assert!(pair.guest.game().unwrap().history().is_empty());
    }

    #[test]
    fn guest_rejoins_after_connect() {
        let mut pair = Pair::new(3);
        pair.guest.join_as_guest("Brook").unwrap();
        let _dropped_before_connect = pair.guest.take_outbox();
        pair.guest.handle_peer_connected();
        pair.guest_to_host();
        assert!(pair.host.guest_joined());
        assert_eq!(pair.host.names().guest, "Brook");
    }

    #[test]
    fn disconnect_leaves_state_untouched() {
        let mut pair = Pair::started(3);
        pair.host.handle_peer_disconnected();
        assert_eq!(pair.host.state(), CoordinatorState::RoundActive);
        assert!(pair
            .host
            .drain_events()
            .any(|e| e == GameEvent::PeerDisconnected));
    }

    #[test]
    fn remote_role_cannot_be_submitted_locally() {
        let mut pair = Pair::started(3);
        assert_eq!(
            pair.host.submit_guess(Role::Guest, 5),
            GuessOutcome::NotAccepting
        );
        assert!(pair.observer.has_violation(ViolationKind::InternalError));
    }
}
