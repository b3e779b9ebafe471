//! Coordinator and game state invariants hold after every step of a game,
//! and a well-behaved game reports no violations.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use year_duel::telemetry::{
    CollectingObserver, InvariantChecker, ViolationKind, ViolationSeverity,
};
use year_duel::{
    Catalog, CoordinatorState, GameError, InventionFact, Mode, PerRole, Role, RoundCoordinator,
    RoundState, SessionConfig,
};

fn check(coordinator: &RoundCoordinator) {
    if let Err(violation) = coordinator.check_invariants() {
        panic!("invariant broken: {violation}");
    }
}

fn names() -> PerRole<String> {
    PerRole::new("Ada".to_owned(), "Brook".to_owned())
}

#[test]
fn invariants_hold_through_a_whole_local_game() {
    let observer = Arc::new(CollectingObserver::new());
    let mut coordinator = RoundCoordinator::new(
        Mode::Local,
        Catalog::builtin(),
        &SessionConfig::deterministic(5),
    )
    .with_violation_observer(observer.clone());
    check(&coordinator);
    coordinator.open_session().unwrap();
    check(&coordinator);
    coordinator.start_game(names()).unwrap();
    check(&coordinator);

    while coordinator.state() != CoordinatorState::GameComplete {
        coordinator.submit_guess(Role::Guest, 1492);
        check(&coordinator);
        coordinator.submit_guess(Role::Host, 1776);
        check(&coordinator);
        coordinator.advance_round().unwrap();
        check(&coordinator);
    }
    let game = coordinator.game().unwrap();
    assert_eq!(game.history().len(), game.total_rounds() as usize);
    game.check_invariants().unwrap();

    coordinator.reset_game();
    check(&coordinator);
    assert!(observer.is_empty(), "unexpected: {:?}", observer.violations());
}

#[test]
fn round_zero_is_rejected_by_the_checker() {
    let item = InventionFact::new("Fork", 1000, "Once considered scandalous");
    assert!(RoundState::new(item.clone(), 0).check_invariants().is_err());
    assert!(RoundState::new(item, 1).check_invariants().is_ok());
}

#[test]
fn incomplete_resolution_is_a_contract_violation() {
    let err = GameError::IncompleteRound {
        round: 1,
        missing: Role::Guest,
    };
    assert!(err.is_contract_violation());
    assert!(!GameError::MissingName { role: Role::Host }.is_contract_violation());
    assert!(!GameError::GuestNotJoined.is_contract_violation());
}

#[test]
fn misrouted_messages_are_reported_not_applied() {
    let observer = Arc::new(CollectingObserver::new());
    let mut guest = RoundCoordinator::new(
        Mode::Networked {
            local_role: Role::Guest,
        },
        Catalog::builtin(),
        &SessionConfig::default(),
    )
    .with_violation_observer(observer.clone());

    // A guest never receives a GuestJoined.
    guest.handle_message(year_duel::Message::GuestJoined {
        guest_name: "Mallory".to_owned(),
    });
    check(&guest);
    assert_eq!(guest.state(), CoordinatorState::Idle);
    assert!(observer.has_violation(ViolationKind::RoundProtocol));
    assert!(observer.has_severity(ViolationSeverity::Warning));
    assert!(!observer.has_severity(ViolationSeverity::Critical));
}

#[test]
fn collected_violations_serialize_for_log_pipelines() {
    let observer = Arc::new(CollectingObserver::new());
    let mut coordinator = RoundCoordinator::new(
        Mode::Local,
        Catalog::builtin(),
        &SessionConfig::default(),
    )
    .with_violation_observer(observer.clone());
    coordinator.handle_message(year_duel::Message::Reset { game: 4 });

    let violations = observer.violations();
    assert_eq!(violations.len(), 1);
    let value = serde_json::to_value(&violations[0]).unwrap();
    assert_eq!(value["kind"], "round_protocol");
    assert_eq!(value["severity"], "warning");
    assert!(value["location"].as_str().unwrap().contains("coordinator.rs"));
}
