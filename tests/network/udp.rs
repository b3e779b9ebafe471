//! Full games over real UDP sockets on the loopback interface.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serial_test::serial;
use year_duel::{
    ChannelConfig, CoordinatorState, GameEvent, PerRole, Role, SessionBuilder, UdpChannel,
};

use crate::common::{connect, drain, fork_catalog, play_to_completion, pump_until};

fn loopback_channel() -> UdpChannel {
    UdpChannel::bind(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        ChannelConfig::lan(),
    )
    .unwrap()
}

fn builder() -> SessionBuilder {
    SessionBuilder::new()
        .with_catalog(fork_catalog())
        .with_total_rounds(3)
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn full_game_over_udp() {
    let (mut host, mut guest) = connect(builder, loopback_channel(), loopback_channel());
    assert!(host.is_connected());
    assert!(guest.is_connected());

    host.start_game("Ada").unwrap();
    play_to_completion(&mut host, &mut guest, 1000, 950);

    let summary = guest.summary().unwrap();
    assert_eq!(summary, host.summary().unwrap());
    // 50 years off: 800 - 150 = 650 per round
    assert_eq!(summary.scores, PerRole::new(3000, 1950));
    assert_eq!(summary.winner, Some(Role::Host));
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn room_token_is_the_host_address() {
    let channel = loopback_channel();
    let addr = channel.local_addr().unwrap();
    let host = builder().start_host_session(channel).unwrap();
    assert_eq!(host.room_token().unwrap().as_str(), addr.to_string());
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn guest_leaving_is_noticed_by_the_host() {
    let (mut host, mut guest) = connect(builder, loopback_channel(), loopback_channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    let _ = drain(&mut host);

    // Dropping the channel says goodbye.
    drop(guest);
    let mut other = builder().start_local_session().unwrap();
    assert!(pump_until(&mut host, &mut other, |h, _| !h.is_connected()));
    assert!(drain(&mut host).contains(&GameEvent::PeerDisconnected));
    assert_eq!(host.state(), CoordinatorState::RoundActive);
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn malformed_token_fails_the_guest_session() {
    let result = builder().start_guest_session(loopback_channel(), &"not-an-address".into());
    assert!(result.is_err());
}
