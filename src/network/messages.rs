use serde::{Deserialize, Serialize};

use crate::catalog::InventionFact;
use crate::game_state::{PerRole, Role, RoundResult};

/// Messages exchanged between the two coordinators.
///
/// `game` is assigned by the host and increases with every started game.
/// Receivers drop messages for any other game, and every message may be
/// processed more than once without changing the outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// Guest → host: a guest is present and ready.
    GuestJoined {
        /// The guest's display name.
        guest_name: String,
    },
    /// Host → guest: round 1 of a new game.
    GameStart {
        /// Game number.
        game: u64,
        /// Round 1's item.
        item: InventionFact,
        /// Host display name.
        host_name: String,
        /// Guest display name as known by the host.
        guest_name: String,
        /// Rounds in this game.
        total_rounds: u32,
    },
    /// Either → other: a submitted guess.
    Guess {
        /// Game number.
        game: u64,
        /// Round the guess belongs to.
        round_index: u32,
        /// Who guessed.
        role: Role,
        /// The guessed year.
        value: i64,
    },
    /// Host → guest: the resolved round and the totals after it.
    Results {
        /// Game number.
        game: u64,
        /// The authoritative result.
        result: RoundResult,
        /// Cumulative totals including `result`.
        scores: PerRole<u64>,
    },
    /// Host → guest: the next round has started.
    NextRound {
        /// Game number.
        game: u64,
        /// The new round.
        round_index: u32,
        /// The new round's item.
        item: InventionFact,
        /// Cumulative totals before the new round.
        scores: PerRole<u64>,
        /// Result of the round just finished, in case `Results` was lost.
        previous: RoundResult,
    },
    /// Host → guest: the game is over.
    GameOver {
        /// Game number.
        game: u64,
        /// Final totals.
        scores: PerRole<u64>,
        /// Result of the final round, in case `Results` was lost.
        last: RoundResult,
    },
    /// Either → other: return to the lobby.
    Reset {
        /// Game being abandoned.
        game: u64,
    },
}

impl Message {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GuestJoined { .. } => "guestJoined",
            Self::GameStart { .. } => "gameStart",
            Self::Guess { .. } => "guess",
            Self::Results { .. } => "results",
            Self::NextRound { .. } => "nextRound",
            Self::GameOver { .. } => "gameOver",
            Self::Reset { .. } => "reset",
        }
    }

    /// The game number the message belongs to, `None` for `GuestJoined`.
    #[must_use]
    pub const fn game(&self) -> Option<u64> {
        match self {
            Self::GuestJoined { .. } => None,
            Self::GameStart { game, .. }
            | Self::Guess { game, .. }
            | Self::Results { game, .. }
            | Self::NextRound { game, .. }
            | Self::GameOver { game, .. }
            | Self::Reset { game } => Some(*game),
        }
    }
}

/// Datagram body of the reference UDP transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketBody {
    /// Responder → initiator, repeated until answered.
    Hello,
    /// Initiator → responder, accepts the handshake.
    Welcome,
    /// Sent periodically while idle so silence can be detected.
    KeepAlive,
    /// Graceful disconnect.
    Bye,
    /// A coordinator message.
    App(Message),
}

/// A datagram: the sender's session magic and a body.
///
/// Each endpoint picks a random non-zero magic; a peer remembers the
/// remote magic from the handshake and drops packets carrying any other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sender's session magic.
    pub magic: u16,
    /// Payload.
    pub body: PacketBody,
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

    #[test]
    fn kind_labels_follow_wire_names() {
        let reset = Message::Reset { game: 3 };
        assert_eq!(reset.kind(), "reset");
        assert_eq!(reset.game(), Some(3));

        let joined = Message::GuestJoined {
            guest_name: "Brook".to_owned(),
        };
        assert_eq!(joined.kind(), "guestJoined");
        assert_eq!(joined.game(), None);
    }

    #[test]
    fn guess_carries_its_game() {
        let guess = Message::Guess {
            game: 2,
            round_index: 4,
            role: Role::Guest,
            value: -500,
        };
        assert_eq!(guess.game(), Some(2));
        assert_eq!(guess.kind(), "guess");
    }

    #[test]
    fn packet_debug_names_body() {
        let packet = Packet {
            magic: 7,
            body: PacketBody::KeepAlive,
        };
        assert!(format!("{packet:?}").contains("KeepAlive"));
    }
}
