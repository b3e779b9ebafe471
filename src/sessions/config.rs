//! Configuration types for game sessions and channels.
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `SessionConfig` | Game length, guess timeout, draw seed | `quick()`, `deterministic()` |
//! | `ChannelConfig` | Handshake, keepalive and fallback timing | `lan()`, `patient()` |
//!
//! # Example
//!
//! ```
//! use year_duel::{ChannelConfig, SessionConfig};
//! use web_time::Duration;
//!
//! let session = SessionConfig {
//!     guess_timeout: Some(Duration::from_secs(20)),
//!     ..SessionConfig::quick()
//! };
//! assert!(session.validate().is_ok());
//! assert!(ChannelConfig::lan().validate().is_ok());
//! ```

use web_time::Duration;

use crate::error::{GameError, GameResult};

/// Default number of rounds in a game.
pub const DEFAULT_TOTAL_ROUNDS: u32 = 5;

/// Upper bound accepted for [`SessionConfig::total_rounds`].
pub const MAX_TOTAL_ROUNDS: u32 = 100;

/// Settings that shape a game.
///
/// New fields may be added; construct with `..SessionConfig::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "SessionConfig has no effect unless passed to SessionBuilder::with_session_config()"]
pub struct SessionConfig {
    /// Rounds per game, fixed when a game starts.
    ///
    /// Default: 5
    pub total_rounds: u32,

    /// How long to wait for the peer's guess after the local guess is in.
    /// When it expires the local guess is re-sent and
    /// [`GameEvent::PeerGuessOverdue`] is emitted. No one forfeits.
    ///
    /// Default: `None` (wait indefinitely)
    ///
    /// [`GameEvent::PeerGuessOverdue`]: crate::GameEvent::PeerGuessOverdue
    pub guess_timeout: Option<Duration>,

    /// Seed for item draws. `None` seeds from the clock.
    ///
    /// Default: `None`
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            guess_timeout: None,
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Creates a new `SessionConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Three-round games.
    pub fn quick() -> Self {
        Self {
            total_rounds: 3,
            ..Self::default()
        }
    }

    /// Default settings with a fixed draw seed, for reproducible games.
    ///
    /// ```
    /// use year_duel::SessionConfig;
    ///
    /// assert_eq!(SessionConfig::deterministic(42).seed, Some(42));
    /// ```
    pub fn deterministic(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Validates the session configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> GameResult<()> {
        if self.total_rounds < 1 || self.total_rounds > MAX_TOTAL_ROUNDS {
            return Err(GameError::InvalidConfig {
                info: format!(
                    "total_rounds must be between 1 and {}, got {}",
                    MAX_TOTAL_ROUNDS, self.total_rounds
                ),
            });
        }
        if let Some(timeout) = self.guess_timeout {
            check_duration("guess_timeout", timeout, 100, 600_000)?;
        }
        Ok(())
    }
}

/// Timing for channel establishment and liveness.
///
/// New fields may be added; construct with `..ChannelConfig::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ChannelConfig has no effect unless passed to a channel constructor"]
pub struct ChannelConfig {
    /// How long a responder waits for the handshake before giving up
    /// (and, inside a fallback channel, moving to the next transport).
    ///
    /// Default: 10s
    pub connect_timeout: Duration,

    /// Time between handshake retries.
    ///
    /// Default: 250ms
    pub handshake_retry_interval: Duration,

    /// Silence after which the peer is considered gone.
    ///
    /// Default: 5s
    pub peer_timeout: Duration,

    /// Time between keepalives while idle.
    ///
    /// Default: 1s
    pub keepalive_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_retry_interval: Duration::from_millis(250),
            peer_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(1),
        }
    }
}

impl ChannelConfig {
    /// Creates a new `ChannelConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timeouts for a local network.
    pub fn lan() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            handshake_retry_interval: Duration::from_millis(50),
            peer_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_millis(250),
        }
    }

    /// Generous timeouts for slow or lossy links.
    pub fn patient() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            handshake_retry_interval: Duration::from_millis(500),
            peer_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(2),
        }
    }

    /// Validates the channel configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if any value is out of range or
    /// `peer_timeout` does not exceed `keepalive_interval`.
    pub fn validate(&self) -> GameResult<()> {
        check_duration("connect_timeout", self.connect_timeout, 1, 300_000)?;
        check_duration(
            "handshake_retry_interval",
            self.handshake_retry_interval,
            1,
            60_000,
        )?;
        check_duration("peer_timeout", self.peer_timeout, 1, 300_000)?;
        check_duration("keepalive_interval", self.keepalive_interval, 1, 60_000)?;
        if self.peer_timeout <= self.keepalive_interval {
            return Err(GameError::InvalidConfig {
                info: format!(
                    "peer_timeout ({}ms) must exceed keepalive_interval ({}ms)",
                    self.peer_timeout.as_millis(),
                    self.keepalive_interval.as_millis()
                ),
            });
        }
        Ok(())
    }
}

fn check_duration(field: &str, value: Duration, min_ms: u64, max_ms: u64) -> GameResult<()> {
    if value < Duration::from_millis(min_ms) || value > Duration::from_millis(max_ms) {
        return Err(GameError::InvalidConfig {
            info: format!(
                "{} must be between {}ms and {}ms, got {}ms",
                field,
                min_ms,
                max_ms,
                value.as_millis()
            ),
        });
    }
    Ok(())
}
