//! Local (same-device) session tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use year_duel::scoring::score;
use year_duel::{
    AdvanceOutcome, CoordinatorState, GameError, GameEvent, GuessOutcome, PerRole, Role,
    SessionBuilder, SessionConfig,
};

use crate::common::{drain, fork_catalog, three_item_catalog};

#[test]
fn full_local_game_accumulates_scores() {
    let mut session = SessionBuilder::new()
        .with_catalog(three_item_catalog())
        .with_session_config(SessionConfig::deterministic(11))
        .with_total_rounds(3)
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();

    let mut expected = PerRole::new(0_u64, 0_u64);
    for round in 1..=3 {
        let year = session.current_item().unwrap().year;
        let host_guess = year + 30;
        let guest_guess = year - 600;
        expected.host += u64::from(score(host_guess, year));
        expected.guest += u64::from(score(guest_guess, year));

        assert_eq!(
            session.submit_guess_for(Role::Host, host_guess).unwrap(),
            GuessOutcome::Recorded
        );
        assert_eq!(
            session.submit_guess_for(Role::Guest, guest_guess).unwrap(),
            GuessOutcome::Resolved
        );
        assert_eq!(session.game().unwrap().scores(), expected);

        let outcome = session.advance_round().unwrap();
        if round < 3 {
            assert_eq!(outcome, AdvanceOutcome::NextRound { round_index: round + 1 });
        } else {
            assert_eq!(
                outcome,
                AdvanceOutcome::GameComplete {
                    winner: Some(Role::Host)
                }
            );
        }
    }

    let summary = session.summary().unwrap();
    assert_eq!(summary.scores, expected);
    assert_eq!(summary.history.len(), 3);
    assert_eq!(session.state(), CoordinatorState::GameComplete);
}

#[test]
fn three_rounds_over_three_items_never_repeat() {
    let mut session = SessionBuilder::new()
        .with_catalog(three_item_catalog())
        .with_total_rounds(3)
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(session.current_item().unwrap().name.clone());
        session.submit_guess_for(Role::Host, 0).unwrap();
        session.submit_guess_for(Role::Guest, 0).unwrap();
        session.advance_round().unwrap();
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

#[test]
fn more_rounds_than_items_never_stalls() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .with_total_rounds(4)
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    for _ in 0..4 {
        assert_eq!(session.current_item().unwrap().name, "Fork");
        session.submit_guess_for(Role::Host, 1000).unwrap();
        session.submit_guess_for(Role::Guest, 1000).unwrap();
        session.advance_round().unwrap();
    }
    let summary = session.summary().unwrap();
    assert_eq!(summary.scores, PerRole::new(4000, 4000));
    assert_eq!(summary.winner, None);
}

#[test]
fn events_describe_the_round_in_order() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .with_total_rounds(1)
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    session.submit_guess_for(Role::Guest, 1010).unwrap();
    session.submit_guess_for(Role::Host, 990).unwrap();
    session.advance_round().unwrap();

    let kinds: Vec<&str> = drain(&mut session).iter().map(GameEvent::kind).collect();
    assert_eq!(
        kinds,
        [
            "round_started",
            "guess_recorded",
            "guess_recorded",
            "round_resolved",
            "game_completed"
        ]
    );
    assert_eq!(drain(&mut session).len(), 0);
}

#[test]
fn second_guess_for_a_role_is_ignored() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    session.submit_guess_for(Role::Host, 1000).unwrap();
    assert_eq!(
        session.submit_guess_for(Role::Host, 1500).unwrap(),
        GuessOutcome::Duplicate
    );
    assert_eq!(session.round().unwrap().guess(Role::Host), Some(1000));
}

#[test]
fn guesses_after_resolution_are_not_accepted() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    session.submit_guess_for(Role::Host, 1000).unwrap();
    session.submit_guess_for(Role::Guest, 1000).unwrap();
    assert_eq!(
        session.submit_guess_for(Role::Guest, 1).unwrap(),
        GuessOutcome::NotAccepting
    );
}

#[test]
fn cannot_advance_an_unresolved_round() {
    let mut session = SessionBuilder::new().start_local_session().unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    session.submit_guess_for(Role::Host, 1900).unwrap();
    assert!(matches!(
        session.advance_round(),
        Err(GameError::InvalidRequest { .. })
    ));
    assert_eq!(session.state(), CoordinatorState::RoundActive);
}

#[test]
fn rematch_after_completion_starts_fresh() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .with_total_rounds(1)
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    session.submit_guess_for(Role::Host, 1000).unwrap();
    session.submit_guess_for(Role::Guest, 2000).unwrap();
    session.advance_round().unwrap();
    assert_eq!(session.state(), CoordinatorState::GameComplete);

    session.start_local_game("Ada", "Brook").unwrap();
    assert_eq!(session.state(), CoordinatorState::RoundActive);
    assert_eq!(session.game().unwrap().scores(), PerRole::new(0, 0));
    assert!(session.game().unwrap().history().is_empty());
}

#[test]
fn reset_then_start_again() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    session.submit_guess_for(Role::Host, 1000).unwrap();
    session.reset_game();
    assert_eq!(session.state(), CoordinatorState::Idle);
    assert!(session.round().is_none());

    session.start_local_game("Cy", "Dee").unwrap();
    assert_eq!(session.coordinator().names().host, "Cy");
    assert_eq!(session.round().unwrap().guess(Role::Host), None);
}

#[test]
fn text_input_is_parsed_at_the_boundary() {
    let mut session = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .start_local_session()
        .unwrap();
    session.start_local_game("Ada", "Brook").unwrap();
    assert!(matches!(
        session.submit_guess_input(Role::Host, ""),
        Err(GameError::InvalidGuess { .. })
    ));
    assert!(matches!(
        session.submit_guess_input(Role::Host, "1e3"),
        Err(GameError::InvalidGuess { .. })
    ));
    assert_eq!(
        session.submit_guess_input(Role::Host, "  1000\n").unwrap(),
        GuessOutcome::Recorded
    );
    assert_eq!(
        session.submit_guess_input(Role::Guest, "-3500").unwrap(),
        GuessOutcome::Resolved
    );
    let result = session.game().unwrap().history()[0].clone();
    assert_eq!(result.entries[Role::Host].score, 1000);
    assert_eq!(result.entries[Role::Guest].score, 10);
}
