use std::sync::Arc;

use tracing::info;
use web_time::Duration;

use crate::catalog::Catalog;
use crate::coordinator::{Mode, RoundCoordinator};
use crate::error::GameResult;
use crate::game_state::Role;
use crate::network::channel::{Channel, RoomToken};
use crate::sessions::config::SessionConfig;
use crate::sessions::game_session::GameSession;
use crate::telemetry::ViolationObserver;

/// The [`SessionBuilder`] builds every [`GameSession`].
///
/// After setting all appropriate values, call one of the `start_*_session`
/// methods to consume the builder.
///
/// ```
/// use year_duel::{LocalHub, SessionBuilder};
///
/// let hub = LocalHub::with_seed(1);
/// let host = SessionBuilder::new()
///     .with_total_rounds(3)
///     .with_seed(42)
///     .start_host_session(hub.channel())?;
/// let token = host.room_token().cloned().expect("host sessions have a token");
/// let guest = SessionBuilder::new().start_guest_session(hub.channel(), &token)?;
/// assert_eq!(guest.local_role(), Some(year_duel::Role::Guest));
/// # Ok::<(), year_duel::GameError>(())
/// ```
#[must_use = "SessionBuilder must be consumed by calling a start_*_session method"]
pub struct SessionBuilder {
    config: SessionConfig,
    catalog: Option<Catalog>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            config,
            catalog,
            violation_observer,
        } = self;

        f.debug_struct("SessionBuilder")
            .field("config", config)
            .field("catalog_len", &catalog.as_ref().map(Catalog::len))
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            catalog: None,
            violation_observer: None,
        }
    }

    /// Sets the number of rounds per game.
    pub fn with_total_rounds(mut self, total_rounds: u32) -> Self {
        self.config.total_rounds = total_rounds;
        self
    }

    /// Replaces the built-in catalog.
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Seeds item draws, making a host's sequence of items reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Re-sends the local guess whenever the peer's guess is this late.
    pub fn with_guess_timeout(mut self, timeout: Duration) -> Self {
        self.config.guess_timeout = Some(timeout);
        self
    }

    /// Replaces the whole session configuration.
    ///
    /// ```
    /// use year_duel::{SessionBuilder, SessionConfig};
    ///
    /// let builder = SessionBuilder::new().with_session_config(SessionConfig::quick());
    /// # let _ = builder;
    /// ```
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a custom observer for protocol violations.
    ///
    /// Without one, violations are logged through `tracing`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use year_duel::telemetry::CollectingObserver;
    /// use year_duel::SessionBuilder;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = SessionBuilder::new().with_violation_observer(observer.clone());
    /// # let _ = builder;
    /// assert!(observer.is_empty());
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Consumes the builder to create a single-process session where both
    /// players share one device. The session is ready for
    /// [`GameSession::start_local_game`].
    ///
    /// # Errors
    /// [`GameError::InvalidConfig`] if the configuration does not validate.
    ///
    /// [`GameError::InvalidConfig`]: crate::GameError::InvalidConfig
    pub fn start_local_session(self) -> GameResult<GameSession> {
        self.config.validate()?;
        let mut coordinator = self.coordinator(Mode::Local);
        coordinator.open_session()?;
        info!("local session started");
        Ok(GameSession::new(coordinator, None, None, self.config))
    }

    /// Consumes the builder to create the host side of a networked session.
    ///
    /// The channel is established as initiator; share
    /// [`GameSession::room_token`] with the guest.
    ///
    /// # Errors
    /// - [`GameError::InvalidConfig`] if the configuration does not validate.
    /// - [`GameError::Channel`] if the channel cannot be established.
    ///
    /// [`GameError::InvalidConfig`]: crate::GameError::InvalidConfig
    /// [`GameError::Channel`]: crate::GameError::Channel
    pub fn start_host_session(
        self,
        channel: impl Channel + 'static,
    ) -> GameResult<GameSession> {
        self.config.validate()?;
        let mut channel: Box<dyn Channel> = Box::new(channel);
        let token = channel.establish_as_initiator()?;
        let mut coordinator = self.coordinator(Mode::Networked {
            local_role: Role::Host,
        });
        coordinator.open_session()?;
        info!(token = %token, channel = channel.kind(), "host session started");
        Ok(GameSession::new(
            coordinator,
            Some(channel),
            Some(token),
            self.config,
        ))
    }

    /// Consumes the builder to create the guest side of a networked session,
    /// joining the room identified by `token`.
    ///
    /// Call [`GameSession::join_as_guest`] next to announce the guest's name.
    ///
    /// # Errors
    /// - [`GameError::InvalidConfig`] if the configuration does not validate.
    /// - [`GameError::Channel`] if the channel cannot be established.
    ///
    /// [`GameError::InvalidConfig`]: crate::GameError::InvalidConfig
    /// [`GameError::Channel`]: crate::GameError::Channel
    pub fn start_guest_session(
        self,
        channel: impl Channel + 'static,
        token: &RoomToken,
    ) -> GameResult<GameSession> {
        self.config.validate()?;
        let mut channel: Box<dyn Channel> = Box::new(channel);
        channel.establish_as_responder(token)?;
        let coordinator = self.coordinator(Mode::Networked {
            local_role: Role::Guest,
        });
        info!(token = %token, channel = channel.kind(), "guest session started");
        Ok(GameSession::new(
            coordinator,
            Some(channel),
            Some(token.clone()),
            self.config,
        ))
    }

    fn coordinator(&self, mode: Mode) -> RoundCoordinator {
        let catalog = self.catalog.clone().unwrap_or_else(Catalog::builtin);
        let coordinator = RoundCoordinator::new(mode, catalog, &self.config);
        match &self.violation_observer {
            Some(observer) => coordinator.with_violation_observer(Arc::clone(observer)),
            None => coordinator,
        }
    }
}

// ###################
// # UNIT TESTS      #
// ###################
