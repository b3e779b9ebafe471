use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::game_state::Role;
use crate::network::channel::ChannelError;

/// Convenience alias for results returned by this crate.
pub type GameResult<T> = Result<T, GameError>;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), GameError>`].
///
/// Submitting a guess is deliberately absent from this list: [`RoundCoordinator::submit_guess`]
/// reports rejected guesses through its [`GuessOutcome`] instead of failing.
///
/// [`Result<(), GameError>`]: std::result::Result
/// [`RoundCoordinator::submit_guess`]: crate::RoundCoordinator::submit_guess
/// [`GuessOutcome`]: crate::GuessOutcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// You made an invalid request, usually by calling an operation in a state that does not allow it.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// User input could not be parsed as a year. Raised at the session boundary, never by the coordinator.
    InvalidGuess {
        /// The raw input that failed to parse.
        input: String,
    },
    /// A player name was empty or only whitespace.
    MissingName {
        /// The role whose name was missing.
        role: Role,
    },
    /// The host tried to start a networked game before a guest announced itself.
    GuestNotJoined,
    /// A round was resolved while a guess was still missing.
    ///
    /// This is a programming contract violation: correct callers never trigger it.
    /// Check for it with [`GameError::is_contract_violation`].
    IncompleteRound {
        /// The round that was being resolved.
        round: u32,
        /// The first role found without a guess.
        missing: Role,
    },
    /// The underlying channel failed.
    Channel(ChannelError),
    /// A configuration value was out of range.
    InvalidConfig {
        /// Description of the offending value.
        info: String,
    },
    /// A catalog must contain at least one item.
    EmptyCatalog,
}

impl GameError {
    /// Returns `true` for errors that indicate a bug in the caller's sequencing
    /// rather than a condition a user can fix.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self, Self::IncompleteRound { .. })
    }

    pub(crate) fn invalid_request(info: impl Into<String>) -> Self {
        Self::InvalidRequest { info: info.into() }
    }
}

impl Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            GameError::InvalidGuess { input } => {
                write!(f, "'{}' is not a valid year", input)
            },
            GameError::MissingName { role } => {
                write!(f, "A name is required for the {} player", role)
            },
            GameError::GuestNotJoined => {
                write!(f, "Waiting for another player to join first.")
            },
            GameError::IncompleteRound { round, missing } => {
                write!(
                    f,
                    "Contract violation: round {} resolved without a {} guess",
                    round, missing
                )
            },
            GameError::Channel(err) => write!(f, "Channel error: {}", err),
            GameError::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            },
            GameError::EmptyCatalog => write!(f, "The catalog must contain at least one item"),
        }
    }
}

impl Error for GameError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GameError::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChannelError> for GameError {
    fn from(err: ChannelError) -> Self {
        GameError::Channel(err)
    }
}
