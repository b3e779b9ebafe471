//! Redelivery safety: games under duplication, latency, jitter and
//! temporary loss still end with both sides agreeing.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use year_duel::{
    Channel, ChannelError, ChaosChannel, ChaosConfig, ConnectionHandler, CoordinatorState,
    GameEvent, LocalChannel, LocalHub, Message, MessageHandler, RoomToken, SessionBuilder,
};

use crate::common::{connect, drain, play_to_completion, pump_until, three_item_catalog};

/// A chaos channel the test can reconfigure after handing it to a session.
#[derive(Clone)]
struct SharedChaos(Arc<Mutex<ChaosChannel<LocalChannel>>>);

impl SharedChaos {
    fn new(inner: LocalChannel) -> Self {
        Self(Arc::new(Mutex::new(ChaosChannel::new(
            inner,
            ChaosConfig::passthrough(),
        ))))
    }

    fn set_config(&self, config: ChaosConfig) {
        self.0.lock().set_config(config);
    }
}

impl Channel for SharedChaos {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        self.0.lock().establish_as_initiator()
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        self.0.lock().establish_as_responder(token)
    }

    fn send(&mut self, message: &Message) -> bool {
        self.0.lock().send(message)
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.0.lock().on_message(handler);
    }

    fn on_connected(&mut self, handler: ConnectionHandler) {
        self.0.lock().on_connected(handler);
    }

    fn on_disconnected(&mut self, handler: ConnectionHandler) {
        self.0.lock().on_disconnected(handler);
    }

    fn poll(&mut self) {
        self.0.lock().poll();
    }

    fn is_connected(&self) -> bool {
        self.0.lock().is_connected()
    }

    fn kind(&self) -> &'static str {
        "shared-chaos"
    }
}

/// Loses the first outgoing message of one kind and passes everything else.
struct LoseFirst {
    inner: LocalChannel,
    kind: &'static str,
    lost: Arc<AtomicUsize>,
}

impl LoseFirst {
    fn new(inner: LocalChannel, kind: &'static str) -> (Self, Arc<AtomicUsize>) {
        let lost = Arc::new(AtomicUsize::new(0));
        let channel = Self {
            inner,
            kind,
            lost: lost.clone(),
        };
        (channel, lost)
    }
}

impl Channel for LoseFirst {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        self.inner.establish_as_initiator()
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        self.inner.establish_as_responder(token)
    }

    fn send(&mut self, message: &Message) -> bool {
        if message.kind() == self.kind && self.lost.load(Ordering::SeqCst) == 0 {
            self.lost.fetch_add(1, Ordering::SeqCst);
            return self.inner.is_connected();
        }
        self.inner.send(message)
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.inner.on_message(handler);
    }

    fn on_connected(&mut self, handler: ConnectionHandler) {
        self.inner.on_connected(handler);
    }

    fn on_disconnected(&mut self, handler: ConnectionHandler) {
        self.inner.on_disconnected(handler);
    }

    fn poll(&mut self) {
        self.inner.poll();
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn kind(&self) -> &'static str {
        "lose-first"
    }
}

fn builder() -> SessionBuilder {
    SessionBuilder::new()
        .with_catalog(three_item_catalog())
        .with_total_rounds(3)
        .with_seed(99)
}

#[test]
fn duplicated_messages_are_applied_once() {
    let hub = LocalHub::with_seed(21);
    let config = ChaosConfig::builder().duplication_rate(1.0).seed(1).build();
    let host_channel = ChaosChannel::new(hub.channel(), config.clone());
    let guest_channel = ChaosChannel::new(hub.channel(), config);
    let (mut host, mut guest) = connect(builder, host_channel, guest_channel);

    host.start_game("Ada").unwrap();
    play_to_completion(&mut host, &mut guest, 1500, 1700);

    let host_summary = host.summary().unwrap();
    let guest_summary = guest.summary().unwrap();
    assert_eq!(host_summary, guest_summary);
    assert_eq!(guest_summary.history.len(), 3);

    let resolved = drain(&mut guest)
        .into_iter()
        .filter(|e| matches!(e, GameEvent::RoundResolved { .. }))
        .count();
    assert_eq!(resolved, 3);
}

#[test]
fn latency_and_jitter_do_not_split_the_game() {
    let hub = LocalHub::with_seed(22);
    let config = |seed| {
        ChaosConfig::builder()
            .latency(Duration::from_millis(5))
            .jitter(Duration::from_millis(5))
            .duplication_rate(0.3)
            .seed(seed)
            .build()
    };
    let host_channel = ChaosChannel::new(hub.channel(), config(2));
    let guest_channel = ChaosChannel::new(hub.channel(), config(3));
    let (mut host, mut guest) = connect(builder, host_channel, guest_channel);

    host.start_game("Ada").unwrap();
    play_to_completion(&mut host, &mut guest, 0, 2000);
    assert_eq!(host.summary().unwrap(), guest.summary().unwrap());
}

#[test]
fn lost_results_are_recovered_by_the_guess_timeout() {
    let hub = LocalHub::with_seed(23);
    let guest_link = SharedChaos::new(hub.channel());
    let with_timeout = || builder().with_guess_timeout(Duration::from_millis(100));
    let (mut host, mut guest) = connect(with_timeout, hub.channel(), guest_link.clone());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));

    // Everything the host says from here on is lost.
    guest_link.set_config(ChaosConfig::builder().receive_loss_rate(1.0).seed(4).build());
    guest.submit_guess(1900).unwrap();
    host.submit_guess(1800).unwrap();
    assert!(pump_until(&mut host, &mut guest, |h, _| h.state()
        == CoordinatorState::RoundResolved));
    guest.poll();
    assert_eq!(guest.state(), CoordinatorState::RoundActive);

    // The link heals; the guest's repeated guess makes the host repeat the result.
    guest_link.set_config(ChaosConfig::passthrough());
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundResolved));
    assert_eq!(host.game().unwrap().history(), guest.game().unwrap().history());
    assert!(drain(&mut guest)
        .iter()
        .any(|e| matches!(e, GameEvent::PeerGuessOverdue { round_index: 1, .. })));
}

#[test]
fn lost_next_round_is_recovered_by_the_guess_timeout() {
    let hub = LocalHub::with_seed(24);
    let guest_link = SharedChaos::new(hub.channel());
    let with_timeout = || builder().with_guess_timeout(Duration::from_millis(100));
    let (mut host, mut guest) = connect(with_timeout, hub.channel(), guest_link.clone());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));

    guest_link.set_config(ChaosConfig::builder().receive_loss_rate(1.0).seed(5).build());
    guest.submit_guess(100).unwrap();
    host.submit_guess(200).unwrap();
    assert!(pump_until(&mut host, &mut guest, |h, _| h.state()
        == CoordinatorState::RoundResolved));
    host.advance_round().unwrap();
    host.poll();

    guest_link.set_config(ChaosConfig::passthrough());
    assert!(pump_until(&mut host, &mut guest, |_, g| g
        .round()
        .is_some_and(|r| r.round_index() == 2)
        && g.state() == CoordinatorState::RoundActive));
    assert_eq!(guest.game().unwrap().history().len(), 1);
    assert_eq!(host.current_item(), guest.current_item());
    assert_eq!(host.game().unwrap().scores(), guest.game().unwrap().scores());
}

fn patient(rounds: u32) -> impl Fn() -> SessionBuilder {
    move || {
        builder()
            .with_total_rounds(rounds)
            .with_guess_timeout(Duration::from_millis(50))
    }
}

#[test]
fn only_game_start_lost() {
    let hub = LocalHub::with_seed(25);
    let (host_channel, lost) = LoseFirst::new(hub.channel(), "gameStart");
    let (mut host, mut guest) = connect(patient(3), host_channel, hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, _| true));
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(guest.state(), CoordinatorState::AwaitingPlayers);

    // The host's guess tells the guest a game is running.
    host.submit_guess(1500).unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    assert_eq!(guest.current_item(), host.current_item());

    guest.submit_guess(1000).unwrap();
    assert!(pump_until(&mut host, &mut guest, |h, g| h.state()
        == CoordinatorState::RoundResolved
        && g.state() == CoordinatorState::RoundResolved));
    assert_eq!(host.game().unwrap().history(), guest.game().unwrap().history());
}

#[test]
fn only_results_lost() {
    let hub = LocalHub::with_seed(26);
    let (host_channel, lost) = LoseFirst::new(hub.channel(), "results");
    let (mut host, mut guest) = connect(patient(3), host_channel, hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));

    guest.submit_guess(1000).unwrap();
    host.submit_guess(1500).unwrap();
    assert!(pump_until(&mut host, &mut guest, |h, g| h.state()
        == CoordinatorState::RoundResolved
        && g.state() == CoordinatorState::RoundResolved));
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(host.game().unwrap().history(), guest.game().unwrap().history());
}

#[test]
fn only_next_round_lost() {
    let hub = LocalHub::with_seed(27);
    let (host_channel, lost) = LoseFirst::new(hub.channel(), "nextRound");
    let (mut host, mut guest) = connect(patient(3), host_channel, hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    guest.submit_guess(1000).unwrap();
    host.submit_guess(1500).unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundResolved));

    host.advance_round().unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g
        .round()
        .is_some_and(|r| r.round_index() == 2)
        && g.state() == CoordinatorState::RoundActive));
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(host.current_item(), guest.current_item());
    assert_eq!(host.game().unwrap().scores(), guest.game().unwrap().scores());
}

#[test]
fn only_game_over_lost() {
    let hub = LocalHub::with_seed(28);
    let (host_channel, lost) = LoseFirst::new(hub.channel(), "gameOver");
    let (mut host, mut guest) = connect(patient(1), host_channel, hub.channel());
    host.start_game("Ada").unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundActive));
    guest.submit_guess(1000).unwrap();
    host.submit_guess(1500).unwrap();
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::RoundResolved));

    host.advance_round().unwrap();
    assert_eq!(host.state(), CoordinatorState::GameComplete);
    assert!(pump_until(&mut host, &mut guest, |_, g| g.state()
        == CoordinatorState::GameComplete));
    assert_eq!(lost.load(Ordering::SeqCst), 1);
    assert_eq!(host.summary().unwrap(), guest.summary().unwrap());
}
