//! Fuzz target for the coordinator inbox.
//!
//! The input is split into chunks, each decoded as a message and applied
//! to a host and a guest that are mid-game. Whatever arrives, neither may
//! panic, and the round never runs past the game.

#![no_main]

use libfuzzer_sys::fuzz_target;
use year_duel::network::codec;
use year_duel::{Catalog, Message, Mode, PerRole, Role, RoundCoordinator, SessionConfig};

fn coordinator(role: Role) -> RoundCoordinator {
    RoundCoordinator::new(
        Mode::Networked { local_role: role },
        Catalog::builtin(),
        &SessionConfig::deterministic(1),
    )
}

fuzz_target!(|data: &[u8]| {
    let mut host = coordinator(Role::Host);
    let mut guest = coordinator(Role::Guest);
    let _ = host.open_session();
    host.handle_peer_connected();
    guest.handle_peer_connected();
    let _ = guest.join_as_guest("Brook");
    for message in guest.take_outbox() {
        host.handle_message(message);
    }
    let _ = host.start_game(PerRole::new("Ada".to_owned(), "Brook".to_owned()));
    for message in host.take_outbox() {
        guest.handle_message(message);
    }

    for chunk in data.split(|&b| b == 0xFF) {
        if let Ok(message) = codec::decode_value::<Message>(chunk) {
            host.handle_message(message.clone());
            guest.handle_message(message);
        }
        let _ = host.take_outbox();
        let _ = guest.take_outbox();
        for side in [&host, &guest] {
            if let (Some(round), Some(game)) = (side.round(), side.game()) {
                assert!(round.round_index() <= game.total_rounds());
            }
        }
    }
});
