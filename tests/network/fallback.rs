//! Transport fallback: a session keeps working when the preferred
//! transport cannot be used.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::time::Duration;

use serial_test::serial;
use year_duel::{
    Channel, ChannelConfig, ChannelError, CoordinatorState, FallbackChannel, LocalHub,
    SessionBuilder, UdpChannel,
};

use crate::common::{connect, fork_catalog, play_to_completion, pump_until};

fn builder() -> SessionBuilder {
    SessionBuilder::new()
        .with_catalog(fork_catalog())
        .with_total_rounds(2)
}

fn quick_connect() -> ChannelConfig {
    ChannelConfig {
        connect_timeout: Duration::from_millis(200),
        ..ChannelConfig::lan()
    }
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn local_room_token_falls_through_udp() {
    let hub = LocalHub::with_seed(31);
    let udp = UdpChannel::bind_to_port(0, quick_connect()).unwrap();
    let guest_channel = FallbackChannel::new(vec![Box::new(udp), Box::new(hub.channel())], quick_connect());

    let (mut host, mut guest) = connect(builder, hub.channel(), guest_channel);
    host.start_game("Ada").unwrap();
    play_to_completion(&mut host, &mut guest, 1000, 1000);
    assert_eq!(guest.summary().unwrap().winner, None);
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn unreachable_udp_peer_times_out_to_the_next_candidate() {
    // The host listens on a local room, but also owns a UDP socket that
    // never answers. The guest tries UDP first and must give up on it.
    let hub = LocalHub::with_seed(32);
    let mut host_local = hub.channel();
    let local_token = host_local.establish_as_initiator().unwrap();
    let silent = UdpChannel::bind_to_port(0, quick_connect()).unwrap();
    let silent_addr = format!("127.0.0.1:{}", silent.local_addr().unwrap().port());

    let udp = UdpChannel::bind_to_port(0, quick_connect()).unwrap();
    let mut guest_channel = FallbackChannel::new(vec![Box::new(udp)], quick_connect());
    guest_channel
        .establish_as_responder(&silent_addr.as_str().into())
        .unwrap();
    assert_eq!(guest_channel.active_kind(), Some("udp"));

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while !guest_channel.is_exhausted() && std::time::Instant::now() < deadline {
        guest_channel.poll();
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(guest_channel.is_exhausted());
    assert!(!guest_channel.is_connected());
    drop(silent);

    // The same token shape on a working local room connects at once.
    let mut guest_local = FallbackChannel::new(vec![Box::new(hub.channel())], quick_connect());
    guest_local.establish_as_responder(&local_token).unwrap();
    guest_local.poll();
    assert!(guest_local.is_connected());
}

#[test]
fn host_uses_the_first_candidate_that_opens_a_room() {
    let hub = LocalHub::with_seed(33);
    let host_channel = FallbackChannel::new(vec![Box::new(hub.channel())], ChannelConfig::lan());
    let mut host = builder().start_host_session(host_channel).unwrap();
    let token = host.room_token().cloned().unwrap();
    assert_eq!(token.as_str().len(), 6);

    let mut guest = builder().start_guest_session(hub.channel(), &token).unwrap();
    guest.join_as_guest("Brook").unwrap();
    assert!(pump_until(&mut host, &mut guest, |h, _| h.coordinator().guest_joined()));
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
}

#[test]
fn no_candidate_accepting_the_token_is_an_error() {
    let hub = LocalHub::with_seed(34);
    let result = builder().start_guest_session(
        FallbackChannel::new(vec![Box::new(hub.channel())], ChannelConfig::lan()),
        &"ABCDEF".into(),
    );
    assert!(matches!(
        result,
        Err(year_duel::GameError::Channel(ChannelError::Exhausted))
    ));
}
