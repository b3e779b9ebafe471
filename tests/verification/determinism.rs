//! A fixed seed fixes the sequence of items, and a host's choices fully
//! determine what the guest sees.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::collections::BTreeSet;

use year_duel::rng::{Pcg32, SeedableRng};
use year_duel::{
    Catalog, GameSummary, ItemDeck, Mode, PerRole, Role, RoundCoordinator, SessionConfig,
};

fn play_local(seed: u64, rounds: u32, guesses: &[(i64, i64)]) -> (Vec<String>, GameSummary) {
    let config = SessionConfig {
        total_rounds: rounds,
        ..SessionConfig::deterministic(seed)
    };
    let mut coordinator = RoundCoordinator::new(Mode::Local, Catalog::builtin(), &config);
    coordinator
        .start_game(PerRole::new("Ada".to_owned(), "Brook".to_owned()))
        .unwrap();
    let mut items = Vec::new();
    for &(host, guest) in guesses.iter().cycle().take(rounds as usize) {
        items.push(coordinator.round().unwrap().item().name.clone());
        coordinator.submit_guess(Role::Host, host);
        coordinator.submit_guess(Role::Guest, guest);
        coordinator.advance_round().unwrap();
    }
    (items, coordinator.summary().unwrap())
}

fn deliver(from: &mut RoundCoordinator, to: &mut RoundCoordinator) {
    for message in from.take_outbox() {
        to.handle_message(message);
    }
}

#[test]
fn same_seed_same_game() {
    let guesses = [(1900, 1850), (-200, 0), (1450, 1460)];
    let first = play_local(7, 10, &guesses);
    let second = play_local(7, 10, &guesses);
    assert_eq!(first, second);
}

#[test]
fn different_seeds_usually_differ() {
    let guesses = [(0, 0)];
    let sequences: BTreeSet<Vec<String>> = (0..8)
        .map(|seed| play_local(seed, 5, &guesses).0)
        .collect();
    assert!(sequences.len() > 1);
}

#[test]
fn no_repeats_until_the_catalog_is_exhausted() {
    let catalog = Catalog::builtin();
    let mut deck = ItemDeck::new();
    let mut rng = Pcg32::seed_from_u64(3);
    let drawn: BTreeSet<_> = (0..catalog.len())
        .map(|_| deck.draw(&catalog, &mut rng))
        .collect();
    assert_eq!(drawn.len(), catalog.len());

    // The next draw starts a fresh cycle.
    let next = deck.draw(&catalog, &mut rng);
    assert_eq!(deck.used_count(), 1);
    assert!(deck.is_used(next));
}

#[test]
fn guest_mirror_matches_host_exactly() {
    let config = SessionConfig::deterministic(12);
    let mut host = RoundCoordinator::new(
        Mode::Networked {
            local_role: Role::Host,
        },
        Catalog::builtin(),
        &config,
    );
    // The guest's own seed is irrelevant: it never draws.
    let mut guest = RoundCoordinator::new(
        Mode::Networked {
            local_role: Role::Guest,
        },
        Catalog::builtin(),
        &SessionConfig::deterministic(999),
    );
    host.open_session().unwrap();
    host.handle_peer_connected();
    guest.handle_peer_connected();
    guest.join_as_guest("Brook").unwrap();
    deliver(&mut guest, &mut host);
    host.start_game(PerRole::new("Ada".to_owned(), "Brook".to_owned()))
        .unwrap();

    for round in 0..config.total_rounds {
        deliver(&mut host, &mut guest);
        assert_eq!(
            host.round().unwrap().item(),
            guest.round().unwrap().item()
        );
        guest.submit_guess(Role::Guest, 1000 + i64::from(round));
        host.submit_guess(Role::Host, 1900);
        deliver(&mut guest, &mut host);
        host.advance_round().unwrap();
    }
    deliver(&mut host, &mut guest);
    assert_eq!(host.summary(), guest.summary());
    assert_eq!(host.state(), guest.state());
}
