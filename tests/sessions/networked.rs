//! Host and guest sessions over the in-process channel.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use year_duel::telemetry::{CollectingObserver, ViolationKind};
use year_duel::{
    Channel, CoordinatorState, GameError, GameEvent, GuessOutcome, LocalHub, Message, PerRole,
    Role, SessionBuilder,
};

use crate::common::{
    connect, drain, fork_catalog, play_to_completion, pump_until, three_item_catalog,
};

fn two_round_builder() -> SessionBuilder {
    SessionBuilder::new()
        .with_catalog(three_item_catalog())
        .with_total_rounds(2)
}

#[test]
fn guest_mirrors_the_host_game() {
    let hub = LocalHub::with_seed(1);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    play_to_completion(&mut host, &mut guest, 1500, 1000);

    let host_summary = host.summary().unwrap();
    let guest_summary = guest.summary().unwrap();
    assert_eq!(host_summary, guest_summary);
    assert_eq!(host_summary.history.len(), 2);
    assert_eq!(guest.coordinator().names(), &PerRole::new("Ada".to_owned(), "Brook".to_owned()));
}

#[test]
fn guest_sees_the_same_items_in_the_same_order() {
    let hub = LocalHub::with_seed(2);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    assert_eq!(host.current_item(), guest.current_item());

    host.submit_guess(0).unwrap();
    guest.submit_guess(0).unwrap();
    assert!(pump_until(&mut host, &mut guest, |h, _| h.state()
        == CoordinatorState::RoundResolved));
    host.advance_round().unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g
        .round()
        .is_some_and(|r| r.round_index() == 2)));
    assert_eq!(host.current_item(), guest.current_item());
}

#[test]
fn guest_learns_results_only_from_the_host() {
    let hub = LocalHub::with_seed(3);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));

    guest.submit_guess(1200).unwrap();
    // Both guesses are known to the guest once the host's arrives, but the
    // guest waits for the host's verdict.
    host.submit_guess(900).unwrap();
    guest.poll();
    assert_ne!(guest.state(), CoordinatorState::RoundResolved);

    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundResolved));
    let host_result = host.game().unwrap().history()[0].clone();
    let guest_result = guest.game().unwrap().history()[0].clone();
    assert_eq!(host_result, guest_result);
}

#[test]
fn guest_cannot_drive_the_game() {
    let hub = LocalHub::with_seed(4);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    assert!(matches!(
        guest.start_game("Brook"),
        Err(GameError::InvalidRequest { .. })
    ));
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    assert_eq!(
        guest.submit_guess_for(Role::Host, 5).unwrap(),
        GuessOutcome::NotAccepting
    );
    assert!(matches!(
        guest.advance_round(),
        Err(GameError::InvalidRequest { .. })
    ));
}

#[test]
fn host_needs_a_guest_before_starting() {
    let hub = LocalHub::with_seed(5);
    let mut host = two_round_builder().start_host_session(hub.channel()).unwrap();
    assert_eq!(host.state(), CoordinatorState::AwaitingPlayers);
    assert_eq!(host.start_game("Ada"), Err(GameError::GuestNotJoined));
    assert_eq!(
        host.start_game(" "),
        Err(GameError::MissingName { role: Role::Host })
    );
}

#[test]
fn guest_joined_event_carries_the_name() {
    let hub = LocalHub::with_seed(6);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    let events = drain(&mut host);
    assert!(events.contains(&GameEvent::PeerConnected));
    assert!(events.contains(&GameEvent::GuestJoined {
        guest_name: "Brook".to_owned()
    }));
    assert!(drain(&mut guest).contains(&GameEvent::PeerConnected));
}

#[test]
fn rematch_reaches_the_guest() {
    let hub = LocalHub::with_seed(7);
    let builder = || {
        SessionBuilder::new()
            .with_catalog(fork_catalog())
            .with_total_rounds(1)
    };
    let (mut host, mut guest) = connect(builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    play_to_completion(&mut host, &mut guest, 1000, 1100);
    assert_eq!(guest.summary().unwrap().winner, Some(Role::Host));

    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    assert_eq!(guest.game().unwrap().scores(), PerRole::new(0, 0));
    assert_eq!(guest.coordinator().game_number(), 2);
}

#[test]
fn reset_from_either_side_returns_both_to_idle() {
    let hub = LocalHub::with_seed(8);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));

    guest.reset_game();
    assert!(pump_until(&mut host, &mut guest, |h, _| h.state()
        == CoordinatorState::Idle));
    assert_eq!(guest.state(), CoordinatorState::Idle);

    // Names survive the reset, so the host can go again straight away.
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
}

#[test]
fn peer_leaving_keeps_the_game_state() {
    let hub = LocalHub::with_seed(9);
    let (mut host, mut guest) = connect(two_round_builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    host.submit_guess(1).unwrap();
    let _ = drain(&mut host);

    drop(guest);
    host.poll();
    assert!(drain(&mut host).contains(&GameEvent::PeerDisconnected));
    assert_eq!(host.state(), CoordinatorState::RoundActive);
    assert_eq!(host.round().unwrap().guess(Role::Host), Some(1));
}

#[test]
fn overdue_guess_is_reported_without_forfeit() {
    let hub = LocalHub::with_seed(10);
    let builder = || {
        SessionBuilder::new()
            .with_catalog(fork_catalog())
            .with_guess_timeout(Duration::from_millis(100))
    };
    let (mut host, mut guest) = connect(builder, hub.channel(), hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    host.submit_guess(1000).unwrap();
    let _ = drain(&mut host);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut overdue = false;
    while !overdue && Instant::now() < deadline {
        host.poll();
        guest.poll();
        overdue = drain(&mut host)
            .iter()
            .any(|e| matches!(e, GameEvent::PeerGuessOverdue { round_index: 1, .. }));
        thread::sleep(Duration::from_millis(10));
    }
    assert!(overdue, "no overdue notification within the deadline");
    assert_eq!(host.state(), CoordinatorState::RoundActive);

    // The guess still counts once it arrives.
    guest.submit_guess(1000).unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundResolved));
    assert_eq!(guest.game().unwrap().scores(), PerRole::new(1000, 1000));
}

#[test]
fn messages_for_another_game_are_reported() {
    let hub = LocalHub::with_seed(11);
    let observer = Arc::new(CollectingObserver::new());
    let mut host = SessionBuilder::new()
        .with_catalog(fork_catalog())
        .with_violation_observer(observer.clone())
        .start_host_session(hub.channel())
        .unwrap();
    let token = host.room_token().cloned().unwrap();

    // A bare channel plays a misbehaving guest.
    let mut peer = hub.channel();
    peer.establish_as_responder(&token).unwrap();
    peer.poll();
    assert!(peer.is_connected());
    assert!(peer.send(&Message::GuestJoined {
        guest_name: "Brook".to_owned()
    }));
    host.poll();
    host.start_game("Ada").unwrap();

    assert!(peer.send(&Message::Guess {
        game: 99,
        round_index: 1,
        role: Role::Guest,
        value: 1000,
    }));
    host.poll();
    assert!(observer.has_violation(ViolationKind::RoundProtocol));
    assert_eq!(host.round().unwrap().guess(Role::Guest), None);
    assert_eq!(host.state(), CoordinatorState::RoundActive);
}
