//! Convenient re-exports for common usage.
//!
//! ```rust
//! use year_duel::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Sessions**: [`GameSession`], [`SessionBuilder`], [`SessionConfig`], [`ChannelConfig`]
//! - **Coordination**: [`RoundCoordinator`], [`CoordinatorState`], [`GuessOutcome`], [`AdvanceOutcome`], [`GameEvent`]
//! - **Game data**: [`Role`], [`PerRole`], [`RoundResult`], [`GameSummary`], [`InventionFact`], [`Catalog`]
//! - **Transports**: [`Channel`], [`RoomToken`], [`LocalHub`], [`UdpChannel`], [`FallbackChannel`], [`ChaosChannel`]
//! - **Errors**: [`GameError`], [`GameResult`], [`ChannelError`]

pub use crate::catalog::{Catalog, InventionFact};
pub use crate::coordinator::{AdvanceOutcome, CoordinatorState, GuessOutcome, RoundCoordinator};
pub use crate::error::{GameError, GameResult};
pub use crate::game_state::{GameSummary, PerRole, Role, RoundResult};
pub use crate::network::channel::{Channel, ChannelError, RoomToken};
pub use crate::network::chaos_channel::ChaosChannel;
pub use crate::network::fallback_channel::FallbackChannel;
pub use crate::network::local_channel::LocalHub;
pub use crate::network::udp_channel::UdpChannel;
pub use crate::scoring::score;
pub use crate::sessions::builder::SessionBuilder;
pub use crate::sessions::config::{ChannelConfig, SessionConfig};
pub use crate::sessions::game_session::GameSession;
pub use crate::GameEvent;
