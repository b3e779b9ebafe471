//! Property-based tests with proptest.
//!
//! - Scores are always within [10, 1000], symmetric and never grow with distance
//! - Totals always equal the sum of the per-round scores
//! - A guest that sees every host message any number of times ends up with
//!   exactly the host's game

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use proptest::prelude::*;
use year_duel::scoring::{band_for, score, ScoreBand, MIN_SCORE, PERFECT_SCORE};
use year_duel::telemetry::InvariantChecker;
use year_duel::{
    Catalog, CoordinatorState, Message, Mode, PerRole, Role, RoundCoordinator, SessionConfig,
};

fn names() -> PerRole<String> {
    PerRole::new("Ada".to_owned(), "Brook".to_owned())
}

fn networked(role: Role, seed: u64, rounds: u32) -> RoundCoordinator {
    let config = SessionConfig {
        total_rounds: rounds,
        ..SessionConfig::deterministic(seed)
    };
    RoundCoordinator::new(Mode::Networked { local_role: role }, Catalog::builtin(), &config)
}

/// Delivers each message `copies[i % copies.len()]` times.
fn deliver(messages: Vec<Message>, to: &mut RoundCoordinator, copies: &[u8]) {
    for (index, message) in messages.into_iter().enumerate() {
        let times = copies.get(index % copies.len().max(1)).copied().unwrap_or(1).max(1);
        for _ in 0..times {
            to.handle_message(message.clone());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn score_is_bounded(guess in any::<i64>(), year in any::<i64>()) {
        let points = score(guess, year);
        prop_assert!((MIN_SCORE..=PERFECT_SCORE).contains(&points));
    }

    #[test]
    fn score_is_symmetric(guess in -100_000i64..100_000, year in -100_000i64..100_000) {
        prop_assert_eq!(score(guess, year), score(year, guess));
        prop_assert_eq!(score(year + (year - guess), year), score(guess, year));
    }

    #[test]
    fn score_never_rewards_being_further_off(distance in 0u64..10_000, extra in 0u64..500) {
        let near = band_for(distance).points(distance);
        let far_distance = distance + extra;
        let far = band_for(far_distance).points(far_distance);
        prop_assert!(far <= near, "{} at {} vs {} at {}", far, far_distance, near, distance);
    }

    #[test]
    fn only_exact_guesses_are_perfect(year in -10_000i64..10_000, offset in 1i64..5_000) {
        prop_assert_eq!(band_for(0), ScoreBand::Exact);
        prop_assert!(score(year + offset, year) < PERFECT_SCORE);
    }

    #[test]
    fn totals_are_the_sum_of_rounds(
        seed in any::<u64>(),
        guesses in prop::collection::vec((-5000i64..2100, -5000i64..2100), 1..12),
    ) {
        let config = SessionConfig {
            total_rounds: guesses.len() as u32,
            ..SessionConfig::deterministic(seed)
        };
        let mut coordinator = RoundCoordinator::new(Mode::Local, Catalog::builtin(), &config);
        coordinator.start_game(names()).unwrap();

        let mut expected = PerRole::new(0u64, 0u64);
        for &(host, guest) in &guesses {
            let year = coordinator.round().unwrap().item().year;
            expected.host += u64::from(score(host, year));
            expected.guest += u64::from(score(guest, year));
            coordinator.submit_guess(Role::Host, host);
            coordinator.submit_guess(Role::Guest, guest);
            prop_assert_eq!(coordinator.game().unwrap().scores(), expected);
            coordinator.advance_round().unwrap();
            prop_assert!(coordinator.check_invariants().is_ok());
        }

        let summary = coordinator.summary().unwrap();
        prop_assert_eq!(summary.history.len(), guesses.len());
        prop_assert_eq!(coordinator.state(), CoordinatorState::GameComplete);
        prop_assert_eq!(summary.winner, expected.leader());
    }

    #[test]
    fn redelivered_messages_never_split_the_game(
        seed in any::<u64>(),
        rounds in 1u32..6,
        host_copies in prop::collection::vec(1u8..4, 1..8),
        guest_copies in prop::collection::vec(1u8..4, 1..8),
        guesses in prop::collection::vec((-3000i64..2100, -3000i64..2100), 6),
    ) {
        let mut host = networked(Role::Host, seed, rounds);
        let mut guest = networked(Role::Guest, seed.wrapping_add(1), rounds);
        host.open_session().unwrap();
        host.handle_peer_connected();
        guest.handle_peer_connected();
        guest.join_as_guest("Brook").unwrap();
        deliver(guest.take_outbox(), &mut host, &guest_copies);
        host.start_game(names()).unwrap();

        for round in 0..rounds as usize {
            deliver(host.take_outbox(), &mut guest, &host_copies);
            prop_assert_eq!(guest.state(), CoordinatorState::RoundActive);
            let (host_guess, guest_guess) = guesses[round];
            guest.submit_guess(Role::Guest, guest_guess);
            host.submit_guess(Role::Host, host_guess);
            deliver(guest.take_outbox(), &mut host, &guest_copies);
            prop_assert_eq!(host.state(), CoordinatorState::RoundResolved);
            host.advance_round().unwrap();
            // Whatever the duplicated guesses made the host repeat
            deliver(host.take_outbox(), &mut guest, &host_copies);
            deliver(guest.take_outbox(), &mut host, &guest_copies);
        }
        deliver(host.take_outbox(), &mut guest, &host_copies);

        prop_assert_eq!(host.state(), CoordinatorState::GameComplete);
        prop_assert_eq!(guest.state(), CoordinatorState::GameComplete);
        prop_assert_eq!(host.summary(), guest.summary());
        prop_assert!(guest.check_invariants().is_ok());
    }
}
