//! A channel decorator for fault injection testing.
//!
//! [`ChaosChannel`] wraps any [`Channel`] to simulate loss, duplication,
//! latency and jitter. Connection events pass straight through; only
//! application messages are disturbed. A seeded configuration makes every
//! run reproducible, which is what the redelivery-safety tests rely on.
//!
//! # Example
//!
//! ```
//! use year_duel::{ChaosChannel, ChaosConfig, LocalHub};
//! use web_time::Duration;
//!
//! let config = ChaosConfig::builder()
//!     .latency(Duration::from_millis(20))
//!     .send_loss_rate(0.1)
//!     .duplication_rate(0.05)
//!     .seed(42)
//!     .build();
//! let hub = LocalHub::new();
//! let channel = ChaosChannel::new(hub.channel(), config);
//! assert_eq!(channel.stats().messages_sent, 0);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use web_time::{Duration, Instant};

use crate::network::channel::{
    Channel, ChannelError, ConnectionHandler, MessageHandler, RoomToken,
};
use crate::network::messages::Message;
use crate::rng::{Pcg32, Rng, SeedableRng};

/// Configuration for fault injection.
///
/// Use [`ChaosConfig::builder()`] for a fluent configuration API.
/// Durations default to zero and rates to 0.0 (no effect).
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosConfig {
    /// Base delay added to every received message (default: 0ms)
    pub latency: Duration,

    /// Maximum random variation around `latency` (default: 0ms).
    /// The actual offset is uniform in `[-jitter, +jitter]`, so messages may
    /// be delivered out of order.
    pub jitter: Duration,

    /// Probability of dropping a message on send (0.0 - 1.0, default: 0.0)
    pub send_loss_rate: f64,

    /// Probability of dropping a message on receive (0.0 - 1.0, default: 0.0)
    pub receive_loss_rate: f64,

    /// Probability of sending a message twice (0.0 - 1.0, default: 0.0)
    pub duplication_rate: f64,

    /// Probability of starting a burst of consecutive send losses (default: 0.0)
    pub burst_loss_probability: f64,

    /// Length of a burst loss (default: 0)
    pub burst_loss_length: usize,

    /// Random seed for deterministic behavior (default: random)
    pub seed: Option<u64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            send_loss_rate: 0.0,
            receive_loss_rate: 0.0,
            duplication_rate: 0.0,
            burst_loss_probability: 0.0,
            burst_loss_length: 0,
            seed: None,
        }
    }
}

impl ChaosConfig {
    /// Creates a new builder for fluent configuration.
    #[must_use]
    pub fn builder() -> ChaosConfigBuilder {
        ChaosConfigBuilder::new()
    }

    /// No faults at all.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Symmetric message loss.
    #[must_use]
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            send_loss_rate: loss_rate,
            receive_loss_rate: loss_rate,
            ..Self::default()
        }
    }

    /// Every message may arrive twice.
    #[must_use]
    pub fn duplicating(duplication_rate: f64) -> Self {
        Self {
            duplication_rate,
            ..Self::default()
        }
    }

    /// A congested mobile link: latency, jitter, some loss and duplication.
    #[must_use]
    pub fn flaky() -> Self {
        Self {
            latency: Duration::from_millis(40),
            jitter: Duration::from_millis(30),
            send_loss_rate: 0.1,
            receive_loss_rate: 0.1,
            duplication_rate: 0.05,
            ..Self::default()
        }
    }
}

/// Builder for [`ChaosConfig`].
#[derive(Debug, Clone, Default)]
#[must_use = "ChaosConfigBuilder must be consumed by calling .build()"]
pub struct ChaosConfigBuilder {
    config: ChaosConfig,
}

impl ChaosConfigBuilder {
    /// Creates a new builder with default (no chaos) settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base latency.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Sets the jitter.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Sets both send and receive loss.
    pub fn loss_rate(mut self, rate: f64) -> Self {
        let rate = rate.clamp(0.0, 1.0);
        self.config.send_loss_rate = rate;
        self.config.receive_loss_rate = rate;
        self
    }

    /// Sets the send loss rate.
    pub fn send_loss_rate(mut self, rate: f64) -> Self {
        self.config.send_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the receive loss rate.
    pub fn receive_loss_rate(mut self, rate: f64) -> Self {
        self.config.receive_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the duplication rate.
    pub fn duplication_rate(mut self, rate: f64) -> Self {
        self.config.duplication_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Configures burst loss: with `probability`, drop `length` sends in a row.
    pub fn burst_loss(mut self, probability: f64, length: usize) -> Self {
        self.config.burst_loss_probability = probability.clamp(0.0, 1.0);
        self.config.burst_loss_length = length;
        self
    }

    /// Sets the random seed for deterministic behavior.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ChaosConfig {
        self.config
    }
}

/// Statistics about injected faults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChaosStats {
    /// Messages passed to `send`
    pub messages_sent: u64,
    /// Messages dropped on send
    pub messages_dropped_send: u64,
    /// Messages sent twice
    pub messages_duplicated: u64,
    /// Messages delivered to the handler
    pub messages_received: u64,
    /// Messages dropped on receive
    pub messages_dropped_receive: u64,
    /// Burst loss events triggered
    pub burst_loss_events: u64,
    /// Messages dropped inside bursts
    pub messages_dropped_burst: u64,
}

#[derive(Debug)]
struct InFlight {
    message: Message,
    deliver_at: Instant,
}

/// A [`Channel`] decorator that injects configurable faults.
pub struct ChaosChannel<C: Channel> {
    inner: C,
    config: ChaosConfig,
    rng: Pcg32,
    inbox: Arc<Mutex<VecDeque<Message>>>,
    in_flight: VecDeque<InFlight>,
    handler: Option<MessageHandler>,
    burst_loss_remaining: usize,
    stats: ChaosStats,
}

impl<C: Channel> ChaosChannel<C> {
    /// Wraps `inner`. The inner channel's message handler is taken over.
    pub fn new(mut inner: C, config: ChaosConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(Pcg32::from_entropy, Pcg32::seed_from_u64);
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&inbox);
        inner.on_message(Box::new(move |message| sink.lock().push_back(message)));
        Self {
            inner,
            config,
            rng,
            inbox,
            in_flight: VecDeque::new(),
            handler: None,
            burst_loss_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Returns a reference to the inner channel.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Replaces the configuration; the random stream continues.
    pub fn set_config(&mut self, config: ChaosConfig) {
        self.config = config;
    }

    /// Returns fault statistics.
    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    /// Resets statistics counters.
    pub fn reset_stats(&mut self) {
        self.stats = ChaosStats::default();
    }

    /// Messages received but held back by latency.
    pub fn messages_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn roll(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            false
        } else {
            self.rng.gen_bool(rate)
        }
    }

    fn should_drop_burst(&mut self) -> bool {
        if self.burst_loss_remaining > 0 {
            self.burst_loss_remaining -= 1;
            self.stats.messages_dropped_burst += 1;
            return true;
        }
        if self.config.burst_loss_length > 0 && self.roll(self.config.burst_loss_probability) {
            self.stats.burst_loss_events += 1;
            self.burst_loss_remaining = self.config.burst_loss_length.saturating_sub(1);
            self.stats.messages_dropped_burst += 1;
            return true;
        }
        false
    }

    fn delivery_time(&mut self, now: Instant) -> Instant {
        let jitter = self.config.jitter;
        if jitter.is_zero() {
            return now + self.config.latency;
        }
        let span = usize::try_from(jitter.as_micros()).unwrap_or(usize::MAX / 4);
        let offset = self
            .rng
            .gen_range_usize(0..span.saturating_mul(2).saturating_add(1));
        let offset = Duration::from_micros(u64::try_from(offset).unwrap_or(0));
        // Negative jitter never moves delivery before now
        now + (self.config.latency + offset).saturating_sub(jitter)
    }
}

impl<C: Channel> Channel for ChaosChannel<C> {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        self.inner.establish_as_initiator()
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        self.inner.establish_as_responder(token)
    }

    fn send(&mut self, message: &Message) -> bool {
        if !self.inner.is_connected() {
            return false;
        }
        self.stats.messages_sent += 1;
        // Simulated loss looks like a successful hand-off to the caller
        if self.should_drop_burst() {
            trace!(kind = message.kind(), "chaos: burst drop");
            return true;
        }
        if self.roll(self.config.send_loss_rate) {
            self.stats.messages_dropped_send += 1;
            trace!(kind = message.kind(), "chaos: send drop");
            return true;
        }
        let sent = self.inner.send(message);
        if sent && self.roll(self.config.duplication_rate) {
            self.stats.messages_duplicated += 1;
            self.inner.send(message);
        }
        sent
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    fn on_connected(&mut self, handler: ConnectionHandler) {
        self.inner.on_connected(handler);
    }

    fn on_disconnected(&mut self, handler: ConnectionHandler) {
        self.inner.on_disconnected(handler);
    }

    fn poll(&mut self) {
        self.inner.poll();
        let now = Instant::now();
        let arrived: Vec<Message> = self.inbox.lock().drain(..).collect();
        for message in arrived {
            if self.roll(self.config.receive_loss_rate) {
                self.stats.messages_dropped_receive += 1;
                trace!(kind = message.kind(), "chaos: receive drop");
                continue;
            }
            let deliver_at = self.delivery_time(now);
            self.in_flight.push_back(InFlight {
                message,
                deliver_at,
            });
        }
        self.in_flight
            .make_contiguous()
            .sort_by_key(|packet| packet.deliver_at);

        while self
            .in_flight
            .front()
            .is_some_and(|packet| packet.deliver_at <= now)
        {
            let Some(packet) = self.in_flight.pop_front() else {
                break;
            };
            self.stats.messages_received += 1;
            if let Some(handler) = self.handler.as_mut() {
                handler(packet.message);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}

impl<C: Channel + std::fmt::Debug> std::fmt::Debug for ChaosChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosChannel")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::local_channel::{LocalChannel, LocalHub};

    type Received = Arc<Mutex<Vec<Message>>>;

    fn pair(config: ChaosConfig) -> (ChaosChannel<LocalChannel>, LocalChannel, Received) {
        let hub = LocalHub::with_seed(9);
        let mut sender = ChaosChannel::new(hub.channel(), config);
        let mut receiver = hub.channel();
        let token = sender.establish_as_initiator().unwrap();
        receiver.establish_as_responder(&token).unwrap();
        sender.poll();
        receiver.poll();
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        receiver.on_message(Box::new(move |message| sink.lock().push(message)));
        (sender, receiver, received)
    }

    fn reset(game: u64) -> Message {
        Message::Reset { game }
    }

    #[test]
    fn passthrough_delivers_everything() {
        let (mut sender, mut receiver, received) = pair(ChaosConfig::passthrough());
        for game in 0..10 {
            assert!(sender.send(&reset(game)));
        }
        receiver.poll();
        assert_eq!(received.lock().len(), 10);
        assert_eq!(sender.stats().messages_sent, 10);
    }

    #[test]
    fn total_send_loss_delivers_nothing() {
        let (mut sender, mut receiver, received) = pair(ChaosConfig::builder().send_loss_rate(1.0).seed(1).build());
        for game in 0..10 {
            assert!(sender.send(&reset(game)));
        }
        receiver.poll();
        assert!(received.lock().is_empty());
        assert_eq!(sender.stats().messages_dropped_send, 10);
    }

    #[test]
    fn full_duplication_doubles_delivery() {
        let (mut sender, mut receiver, received) = pair(ChaosConfig::duplicating(1.0));
        sender.send(&reset(1));
        receiver.poll();
        assert_eq!(*received.lock(), vec![reset(1), reset(1)]);
        assert_eq!(sender.stats().messages_duplicated, 1);
    }

    #[test]
    fn burst_loss_drops_consecutive_sends() {
        let (mut sender, mut receiver, received) =
            pair(ChaosConfig::builder().burst_loss(1.0, 3).seed(4).build());
        for game in 0..3 {
            sender.send(&reset(game));
        }
        receiver.poll();
        assert!(received.lock().is_empty());
        assert_eq!(sender.stats().burst_loss_events, 1);
        assert_eq!(sender.stats().messages_dropped_burst, 3);
    }

    #[test]
    fn same_seed_same_faults() {
        let run = || {
            let (mut sender, _receiver, _) = pair(ChaosConfig::builder().loss_rate(0.5).seed(77).build());
            for game in 0..64 {
                sender.send(&reset(game));
            }
            sender.stats().clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn latency_holds_messages_back() {
        let hub = LocalHub::with_seed(10);
        let mut sender = hub.channel();
        let mut receiver = ChaosChannel::new(
            hub.channel(),
            ChaosConfig::builder()
                .latency(Duration::from_millis(30))
                .seed(2)
                .build(),
        );
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        receiver.on_message(Box::new(move |message| sink.lock().push(message)));
        let token = sender.establish_as_initiator().unwrap();
        receiver.establish_as_responder(&token).unwrap();
        receiver.poll();
        sender.poll();

        assert!(sender.send(&reset(5)));
        receiver.poll();
        assert!(received.lock().is_empty());
        assert_eq!(receiver.messages_in_flight(), 1);

        std::thread::sleep(std::time::Duration::from_millis(50));
        receiver.poll();
        assert_eq!(*received.lock(), vec![reset(5)]);
    }

    #[test]
    fn send_before_connect_is_refused() {
        let hub = LocalHub::with_seed(11);
        let mut channel = ChaosChannel::new(hub.channel(), ChaosConfig::passthrough());
        assert!(!channel.send(&reset(0)));
        assert_eq!(channel.stats().messages_sent, 0);
    }

    #[test]
    fn builder_clamps_rates() {
        let config = ChaosConfig::builder()
            .send_loss_rate(3.0)
            .duplication_rate(-1.0)
            .build();
        assert!((config.send_loss_rate - 1.0).abs() < f64::EPSILON);
        assert!(config.duplication_rate.abs() < f64::EPSILON);
    }
}
