//! Shared helpers for the integration test harnesses.
//!
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{connect, pump_until, three_item_catalog};
//! ```

#![allow(dead_code)] // Each harness uses a different subset.
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::thread;
use std::time::{Duration, Instant};

use year_duel::{
    Catalog, Channel, CoordinatorState, GameEvent, GameSession, InventionFact, SessionBuilder,
};

/// Upper bound for any wait on a peer.
pub const PUMP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between pump iterations.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A catalog where every year is known, so scores can be asserted exactly.
pub fn three_item_catalog() -> Catalog {
    Catalog::new(vec![
        InventionFact::new("Fork", 1000, "Once considered scandalous at the table"),
        InventionFact::new("Telescope", 1608, "Patented in the Netherlands"),
        InventionFact::new("Plough", -4000, "Older than writing"),
    ])
    .unwrap()
}

/// A one-item catalog: every round draws the fork.
pub fn fork_catalog() -> Catalog {
    Catalog::new(vec![InventionFact::new(
        "Fork",
        1000,
        "Once considered scandalous at the table",
    )])
    .unwrap()
}

/// Polls both sessions until `done` holds or [`PUMP_TIMEOUT`] passes.
pub fn pump_until(
    host: &mut GameSession,
    guest: &mut GameSession,
    mut done: impl FnMut(&GameSession, &GameSession) -> bool,
) -> bool {
    let deadline = Instant::now() + PUMP_TIMEOUT;
    while Instant::now() < deadline {
        host.poll();
        guest.poll();
        if done(host, guest) {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    false
}

/// Builds host and guest sessions over the given channels, announces the
/// guest and waits until the host knows about it.
pub fn connect(
    builder: impl Fn() -> SessionBuilder,
    host_channel: impl Channel + 'static,
    guest_channel: impl Channel + 'static,
) -> (GameSession, GameSession) {
    let mut host = builder().start_host_session(host_channel).unwrap();
    let token = host.room_token().cloned().unwrap();
    let mut guest = builder()
        .start_guest_session(guest_channel, &token)
        .unwrap();
    guest.join_as_guest("Brook").unwrap();
    assert!(
        pump_until(&mut host, &mut guest, |h, _| h.coordinator().guest_joined()),
        "guest never reached the host"
    );
    (host, guest)
}

/// Plays every round of a started networked game with fixed guesses and
/// returns once both sides report `GameComplete`.
pub fn play_to_completion(
    host: &mut GameSession,
    guest: &mut GameSession,
    host_guess: i64,
    guest_guess: i64,
) {
    let total = host.coordinator().total_rounds();
    for round in 1..=total {
        assert!(
            pump_until(host, guest, |_, g| g.state() == CoordinatorState::RoundActive
                && g.round().map(|r| r.round_index()) == Some(round)),
            "guest never started round {round}"
        );
        guest.submit_guess(guest_guess).unwrap();
        host.submit_guess(host_guess).unwrap();
        assert!(
            pump_until(host, guest, |h, g| h.state() == CoordinatorState::RoundResolved
                && g.game().map(|game| game.history().len()) == Some(round as usize)),
            "round {round} never resolved on both sides"
        );
        host.advance_round().unwrap();
    }
    assert!(
        pump_until(host, guest, |_, g| g.state() == CoordinatorState::GameComplete),
        "guest never saw the game end"
    );
}

/// Drains and returns every pending event.
pub fn drain(session: &mut GameSession) -> Vec<GameEvent> {
    session.events().collect()
}
