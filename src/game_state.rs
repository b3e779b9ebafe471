//! Per-round and per-game state owned by the [`RoundCoordinator`].
//!
//! [`RoundCoordinator`]: crate::RoundCoordinator

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::catalog::{InventionFact, ItemDeck};
use crate::scoring::score;
use crate::telemetry::{InvariantChecker, InvariantViolation};

/// One of the two fixed participant slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates the session, computes results and drives round advance.
    Host,
    /// Joins the host's session and mirrors its results.
    Guest,
}

impl Role {
    /// Both roles, host first.
    pub const ALL: [Role; 2] = [Role::Host, Role::Guest];

    /// The opposing role.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value for each role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PerRole<T> {
    /// The host's value.
    pub host: T,
    /// The guest's value.
    pub guest: T,
}

impl<T> PerRole<T> {
    /// Creates a pair from both values.
    pub const fn new(host: T, guest: T) -> Self {
        Self { host, guest }
    }

    /// Applies `f` to both values.
    pub fn map<U>(self, mut f: impl FnMut(Role, T) -> U) -> PerRole<U> {
        PerRole {
            host: f(Role::Host, self.host),
            guest: f(Role::Guest, self.guest),
        }
    }

    /// Iterates over `(role, value)` pairs, host first.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        [(Role::Host, &self.host), (Role::Guest, &self.guest)].into_iter()
    }
}

impl<T: Ord> PerRole<T> {
    /// The role holding the strictly larger value, or `None` on a tie.
    pub fn leader(&self) -> Option<Role> {
        match self.host.cmp(&self.guest) {
            std::cmp::Ordering::Greater => Some(Role::Host),
            std::cmp::Ordering::Less => Some(Role::Guest),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl<T> Index<Role> for PerRole<T> {
    type Output = T;

    fn index(&self, role: Role) -> &T {
        match role {
            Role::Host => &self.host,
            Role::Guest => &self.guest,
        }
    }
}

impl<T> IndexMut<Role> for PerRole<T> {
    fn index_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Host => &mut self.host,
            Role::Guest => &mut self.guest,
        }
    }
}

/// Display names for both players.
pub type PlayerNames = PerRole<String>;

/// A participant: their role and display name.
///
/// The name may be empty before setup completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlayerIdentity {
    /// Participant slot.
    pub role: Role,
    /// Display name.
    pub name: String,
}

/// State of the round in progress.
///
/// Replaced, never reset, when the game advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    item: InventionFact,
    guesses: PerRole<Option<i64>>,
    round_index: u32,
}

impl RoundState {
    /// Creates a round with no guesses.
    #[must_use]
    pub fn new(item: InventionFact, round_index: u32) -> Self {
        Self {
            item,
            guesses: PerRole::default(),
            round_index,
        }
    }

    /// Records `value` for `role`. Returns `false` and leaves the round
    /// untouched if that role already guessed.
    pub fn record_guess(&mut self, role: Role, value: i64) -> bool {
        let slot = &mut self.guesses[role];
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// The item shown this round.
    #[must_use]
    pub fn item(&self) -> &InventionFact {
        &self.item
    }

    /// 1-based round number.
    #[must_use]
    pub fn round_index(&self) -> u32 {
        self.round_index
    }

    /// The guess recorded for `role`, if any.
    #[must_use]
    pub fn guess(&self, role: Role) -> Option<i64> {
        self.guesses[role]
    }

    /// Both guess slots.
    #[must_use]
    pub fn guesses(&self) -> PerRole<Option<i64>> {
        self.guesses
    }

    /// The first role without a guess, host first.
    #[must_use]
    pub fn missing_role(&self) -> Option<Role> {
        Role::ALL.into_iter().find(|&role| self.guesses[role].is_none())
    }

    /// Returns true once both roles have guessed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_role().is_none()
    }
}

impl InvariantChecker for RoundState {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.round_index == 0 {
            return Err(InvariantViolation::new(
                "RoundState",
                "round index must be at least 1",
            ));
        }
        Ok(())
    }
}

/// One player's line in a [`RoundResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlayerEntry {
    /// Player name at the time of the round.
    pub name: String,
    /// The submitted year.
    pub guess: i64,
    /// Points awarded.
    pub score: u32,
}

/// Immutable record of a resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RoundResult {
    /// 1-based round number.
    pub round_index: u32,
    /// The item shown.
    pub item: InventionFact,
    /// Ground truth used for scoring.
    pub correct_year: i64,
    /// Each player's guess and score.
    pub entries: PerRole<PlayerEntry>,
}

impl RoundResult {
    /// Scores a completed round.
    ///
    /// Returns `None` if either guess is missing.
    #[must_use]
    pub fn compute(round: &RoundState, names: &PlayerNames) -> Option<Self> {
        let correct_year = round.item.year;
        let host = round.guess(Role::Host)?;
        let guest = round.guess(Role::Guest)?;
        let entry = |role: Role, guess: i64| PlayerEntry {
            name: names[role].clone(),
            guess,
            score: score(guess, correct_year),
        };
        Some(Self {
            round_index: round.round_index,
            item: round.item.clone(),
            correct_year,
            entries: PerRole::new(entry(Role::Host, host), entry(Role::Guest, guest)),
        })
    }

    /// Points per role.
    #[must_use]
    pub fn scores(&self) -> PerRole<u32> {
        PerRole::new(self.entries.host.score, self.entries.guest.score)
    }

    /// The role with the strictly higher score this round; `None` on a tie.
    #[must_use]
    pub fn round_winner(&self) -> Option<Role> {
        self.scores().leader()
    }
}

/// Cumulative game state.
///
/// On the host (or in local play) this is authoritative. On a networked guest
/// it is a mirror built from the host's messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    scores: PerRole<u64>,
    history: Vec<RoundResult>,
    total_rounds: u32,
    used_items: ItemDeck,
}

impl GameState {
    /// Creates a fresh game with zero scores.
    #[must_use]
    pub fn new(total_rounds: u32) -> Self {
        Self {
            scores: PerRole::default(),
            history: Vec::new(),
            total_rounds,
            used_items: ItemDeck::new(),
        }
    }

    /// Adds a locally computed result.
    pub(crate) fn record_result(&mut self, result: RoundResult) {
        self.scores.host += u64::from(result.entries.host.score);
        self.scores.guest += u64::from(result.entries.guest.score);
        self.history.push(result);
    }

    /// Adopts a result and the resulting totals from the host.
    ///
    /// Returns `false` if a result for that round is already present.
    pub(crate) fn adopt_result(&mut self, result: RoundResult, scores: PerRole<u64>) -> bool {
        if self.has_round(result.round_index) {
            return false;
        }
        self.history.push(result);
        self.adopt_scores(scores);
        true
    }

    /// Adopts the host's totals. Scores never decrease within a game.
    pub(crate) fn adopt_scores(&mut self, scores: PerRole<u64>) {
        self.scores.host = self.scores.host.max(scores.host);
        self.scores.guest = self.scores.guest.max(scores.guest);
    }

    pub(crate) fn used_items_mut(&mut self) -> &mut ItemDeck {
        &mut self.used_items
    }

    /// Returns true if a result for `round_index` is in the history.
    #[must_use]
    pub fn has_round(&self, round_index: u32) -> bool {
        self.history.iter().any(|r| r.round_index == round_index)
    }

    /// Cumulative scores.
    #[must_use]
    pub fn scores(&self) -> PerRole<u64> {
        self.scores
    }

    /// Resolved rounds, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RoundResult] {
        &self.history
    }

    /// Number of rounds in this game.
    #[must_use]
    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Items drawn so far.
    #[must_use]
    pub fn used_items(&self) -> &ItemDeck {
        &self.used_items
    }

    /// Overall leader, `None` on a tie.
    #[must_use]
    pub fn winner(&self) -> Option<Role> {
        self.scores.leader()
    }

    /// Snapshot of scores, winner and history.
    #[must_use]
    pub fn summary(&self) -> GameSummary {
        GameSummary {
            scores: self.scores,
            winner: self.winner(),
            history: self.history.clone(),
        }
    }
}

impl InvariantChecker for GameState {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.total_rounds == 0 {
            return Err(InvariantViolation::new(
                "GameState",
                "total rounds must be at least 1",
            ));
        }
        if self.history.len() > self.total_rounds as usize {
            return Err(InvariantViolation::new("GameState", "history longer than the game")
                .with_details(format!(
                    "history={}, total_rounds={}",
                    self.history.len(),
                    self.total_rounds
                )));
        }
        if self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .any(|(earlier, later)| earlier.round_index >= later.round_index)
        {
            return Err(InvariantViolation::new(
                "GameState",
                "history round indices must strictly increase",
            ));
        }

        // Only a gap-free history can be summed back to the totals
        let contiguous = self
            .history
            .iter()
            .zip(1u32..)
            .all(|(result, expected)| result.round_index == expected);
        if contiguous {
            let mut expected = PerRole::<u64>::default();
            for result in &self.history {
                expected.host += u64::from(result.entries.host.score);
                expected.guest += u64::from(result.entries.guest.score);
            }
            if expected != self.scores {
                return Err(InvariantViolation::new(
                    "GameState",
                    "scores do not match the history",
                )
                .with_details(format!("scores={:?}, history sums={:?}", self.scores, expected)));
            }
        }
        Ok(())
    }
}

/// Final or running totals of a game.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GameSummary {
    /// Cumulative scores.
    pub scores: PerRole<u64>,
    /// Strictly higher total, `None` on a tie.
    pub winner: Option<Role>,
    /// Every resolved round.
    pub history: Vec<RoundResult>,
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

    fn fork() -> InventionFact {
        InventionFact::new("Fork", 1000, "fact")
    }

    fn names() -> PlayerNames {
        PerRole::new("Ada".to_owned(), "Brook".to_owned())
    }

    #[test]
    fn role_other_and_display() {
        assert_eq!(Role::Host.other(), Role::Guest);
        assert_eq!(Role::Guest.other(), Role::Host);
        assert_eq!(Role::Guest.to_string(), "guest");
    }

    #[test]
    fn per_role_leader() {
        assert_eq!(PerRole::new(3, 2).leader(), Some(Role::Host));
        assert_eq!(PerRole::new(2, 3).leader(), Some(Role::Guest));
        assert_eq!(PerRole::new(2, 2).leader(), None);
    }

    #[test]
    fn record_guess_is_at_most_once() {
        let mut round = RoundState::new(fork(), 1);
        assert!(round.record_guess(Role::Host, 1200));
        let snapshot = round.clone();
        assert!(!round.record_guess(Role::Host, 5));
        assert_eq!(round, snapshot);
        assert_eq!(round.missing_role(), Some(Role::Guest));
        assert!(round.record_guess(Role::Guest, 500));
        assert!(round.is_complete());
    }

    #[test]
    fn compute_result_for_fork() {
        let mut round = RoundState::new(fork(), 1);
        round.record_guess(Role::Host, 1200);
        round.record_guess(Role::Guest, 500);
        let result = RoundResult::compute(&round, &names()).unwrap();
        assert_eq!(result.scores(), PerRole::new(300, 200));
        assert_eq!(result.round_winner(), Some(Role::Host));
        assert_eq!(result.entries.guest.name, "Brook");
        assert_eq!(result.correct_year, 1000);
    }

    #[test]
    fn compute_requires_both_guesses() {
        let mut round = RoundState::new(fork(), 1);
        round.record_guess(Role::Guest, 500);
        assert!(RoundResult::compute(&round, &names()).is_none());
    }

    #[test]
    fn game_state_accumulates_and_checks() {
        let mut game = GameState::new(2);
        let mut round = RoundState::new(fork(), 1);
        round.record_guess(Role::Host, 1000);
        round.record_guess(Role::Guest, 1000);
        game.record_result(RoundResult::compute(&round, &names()).unwrap());
        assert_eq!(game.scores(), PerRole::new(1000, 1000));
        assert_eq!(game.winner(), None);
        assert!(game.check_invariants().is_ok());
        assert_eq!(game.summary().history.len(), 1);
    }

    #[test]
    fn adopt_ignores_duplicates() {
        let mut round = RoundState::new(fork(), 1);
        round.record_guess(Role::Host, 1200);
        round.record_guess(Role::Guest, 500);
        let result = RoundResult::compute(&round, &names()).unwrap();

        let mut mirror = GameState::new(5);
        assert!(mirror.adopt_result(result.clone(), PerRole::new(300, 200)));
        assert!(!mirror.adopt_result(result, PerRole::new(300, 200)));
        assert_eq!(mirror.history().len(), 1);
        assert_eq!(mirror.scores(), PerRole::new(300, 200));
        assert!(mirror.check_invariants().is_ok());
    }

    #[test]
    fn invariant_flags_score_mismatch() {
        let mut game = GameState::new(5);
        game.adopt_scores(PerRole::new(10, 0));
        assert!(game.check_invariants().is_err());
    }

    #[test]
    fn round_zero_is_invalid() {
        assert!(RoundState::new(fork(), 0).check_invariants().is_err());
        assert!(RoundState::new(fork(), 1).check_invariants().is_ok());
    }
}
