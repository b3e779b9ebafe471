//! # Year Duel
//!
//! Round synchronization for a two-player invention-year guessing game.
//!
//! Two players see the same invention, each guesses the year it appeared,
//! and the closer guess scores more. This crate provides the pieces that keep
//! two peers agreeing on what happened:
//!
//! - [`scoring`]: the distance-banded scoring table.
//! - [`catalog`]: invention facts and draws without repetition.
//! - [`game_state`]: rounds, results and cumulative scores.
//! - [`RoundCoordinator`]: the lifecycle state machine. The host is the
//!   authority for item selection and scoring; the guest mirrors it.
//! - [`Channel`]: a best-effort message transport with local, UDP, fallback
//!   and fault-injecting implementations.
//! - [`GameSession`]: a coordinator bound to a channel, built with [`SessionBuilder`].
//!
//! Instead of registering game callbacks, the caller polls the session and
//! drains [`GameEvent`]s.
//!
//! ```
//! use year_duel::prelude::*;
//!
//! let mut session = SessionBuilder::new()
//!     .with_session_config(SessionConfig::deterministic(3))
//!     .start_local_session()?;
//! session.start_local_game("Ada", "Brook")?;
//! session.submit_guess_for(Role::Host, 1900)?;
//! session.submit_guess_for(Role::Guest, 1850)?;
//! for event in session.events() {
//!     if let GameEvent::RoundResolved { result, .. } = event {
//!         println!("{} was first seen in {}", result.item.name, result.correct_year);
//!     }
//! }
//! # Ok::<(), year_duel::GameError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use web_time::Duration;

pub use catalog::{Catalog, InventionFact, ItemDeck, ItemId};
pub use coordinator::{AdvanceOutcome, CoordinatorState, GuessOutcome, Mode, RoundCoordinator};
pub use error::{GameError, GameResult};
pub use game_state::{
    GameState, GameSummary, PerRole, PlayerEntry, PlayerIdentity, PlayerNames, Role,
    RoundResult, RoundState,
};
pub use network::channel::{Channel, ChannelError, ConnectionHandler, MessageHandler, RoomToken};
pub use network::chaos_channel::{ChaosChannel, ChaosConfig, ChaosConfigBuilder, ChaosStats};
pub use network::fallback_channel::FallbackChannel;
pub use network::local_channel::{LocalChannel, LocalHub};
pub use network::messages::Message;
pub use network::udp_channel::UdpChannel;
pub use sessions::builder::SessionBuilder;
pub use sessions::config::{ChannelConfig, SessionConfig};
pub use sessions::event_drain::EventDrain;
pub use sessions::game_session::GameSession;

pub mod catalog;
pub mod coordinator;
/// Error types returned by the session and coordinator APIs.
pub mod error;
pub mod game_state;
pub mod prelude;
/// Small PCG32 generator used for item draws and channel fault injection.
pub mod rng;
pub mod scoring;
pub mod telemetry;

/// Session assembly: configuration, the builder and the session itself.
pub mod sessions {
    /// Builder for local, host and guest sessions.
    pub mod builder;
    pub mod config;
    /// Borrowing iterator over queued events.
    pub mod event_drain;
    /// The session controller that binds a coordinator to a channel.
    pub mod game_session;
}

/// Message types and the transports that carry them.
pub mod network {
    pub mod channel;
    pub mod chaos_channel;
    /// Binary codec for datagrams, built on bincode.
    pub mod codec;
    pub mod fallback_channel;
    pub mod local_channel;
    /// Wire envelope and the logical round messages.
    pub mod messages;
    /// Reference transport over a non-blocking UDP socket.
    pub mod udp_channel;
}

// #############
// #   EVENTS  #
// #############

/// Notifications produced while a session runs.
///
/// Drain them with [`GameSession::events`] (or [`RoundCoordinator::drain_events`])
/// after each poll.
///
/// ```
/// use year_duel::GameEvent;
///
/// fn describe(event: &GameEvent) -> String {
///     match event {
///         GameEvent::RoundStarted { round_index, item } => {
///             format!("round {round_index}: {}", item.name)
///         }
///         GameEvent::GameCompleted { summary } => format!("winner: {:?}", summary.winner),
///         other => format!("{other:?}"),
///     }
/// }
/// assert_eq!(describe(&GameEvent::GameReset), "GameReset");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The channel reports a connected peer.
    PeerConnected,
    /// The channel reports the peer gone. The game state is unchanged.
    PeerDisconnected,
    /// Host side: a guest announced itself.
    GuestJoined {
        /// The guest's display name.
        guest_name: String,
    },
    /// A round began accepting guesses.
    RoundStarted {
        /// The round's index, starting at 1.
        round_index: u32,
        /// The invention to date.
        item: InventionFact,
    },
    /// A guess was stored, local or remote.
    GuessRecorded {
        /// Who guessed.
        role: Role,
        /// The round the guess belongs to.
        round_index: u32,
    },
    /// A round was scored (or, on a guest, its result arrived from the host).
    RoundResolved {
        /// The round's result.
        result: RoundResult,
        /// Cumulative totals after the round.
        scores: PerRole<u64>,
    },
    /// The final round was played.
    GameCompleted {
        /// Final totals, winner and history.
        summary: GameSummary,
    },
    /// The game was abandoned, locally or by the peer.
    GameReset,
    /// The local guess has waited longer than the configured guess timeout.
    /// The local guess was sent again; no one forfeits.
    PeerGuessOverdue {
        /// The round still waiting.
        round_index: u32,
        /// How long the local guess has been waiting.
        waited: Duration,
    },
}

impl GameEvent {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PeerConnected => "peer_connected",
            Self::PeerDisconnected => "peer_disconnected",
            Self::GuestJoined { .. } => "guest_joined",
            Self::RoundStarted { .. } => "round_started",
            Self::GuessRecorded { .. } => "guess_recorded",
            Self::RoundResolved { .. } => "round_resolved",
            Self::GameCompleted { .. } => "game_completed",
            Self::GameReset => "game_reset",
            Self::PeerGuessOverdue { .. } => "peer_guess_overdue",
        }
    }
}

// ###################
// # UNIT TESTS      #
// ###################
