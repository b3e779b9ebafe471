use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::{debug, info, trace, warn};
use web_time::Instant;

use crate::network::channel::{
    Channel, ChannelError, ConnectionHandler, Handlers, MessageHandler, RoomToken,
};
use crate::network::codec::{self, CodecError};
use crate::network::messages::{Message, Packet, PacketBody};
use crate::report_violation;
use crate::rng::{Pcg32, Rng, SeedableRng};
use crate::sessions::config::ChannelConfig;
use crate::telemetry::{ViolationKind, ViolationSeverity};

/// Largest datagram the receiver reads in full. Anything longer is refused
/// at send time, since `recv_from` would truncate it.
const RECV_BUFFER_SIZE: usize = 4096;
/// Size of the pre-allocated send buffer. Results messages with long names
/// and fun facts stay well below this.
const SEND_BUFFER_SIZE: usize = 1024;
/// A packet larger than this may be fragmented.
/// Source: <https://stackoverflow.com/a/35697810/775982>
const IDEAL_MAX_UDP_PACKET_SIZE: usize = 508;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    Listening,
    Handshaking {
        peer: SocketAddr,
        started: Instant,
        last_hello: Instant,
    },
    Connected {
        peer: SocketAddr,
    },
    Closed,
}

/// Reference networked transport over a non-blocking UDP socket.
///
/// The room token is the initiator's `ip:port`. The responder repeats
/// `Hello` every [`ChannelConfig::handshake_retry_interval`] until the
/// initiator answers `Welcome` or [`ChannelConfig::connect_timeout`] expires.
/// Once connected, each side sends a keepalive after
/// [`ChannelConfig::keepalive_interval`] without traffic and drops the peer
/// after [`ChannelConfig::peer_timeout`] of silence or on `Bye`.
///
/// Every datagram carries the sender's session magic; after the handshake,
/// datagrams with any other magic or from any other address are ignored.
pub struct UdpChannel {
    socket: UdpSocket,
    config: ChannelConfig,
    advertised_ip: Option<IpAddr>,
    state: LinkState,
    magic: u16,
    remote_magic: u16,
    last_send: Instant,
    last_recv: Instant,
    handlers: Handlers,
    /// Receive buffer - reused across recv_from calls
    recv_buffer: [u8; RECV_BUFFER_SIZE],
    /// Send buffer - reused across send_to calls to avoid allocation
    send_buffer: [u8; SEND_BUFFER_SIZE],
}

impl UdpChannel {
    /// Binds a socket to `addr` and sets it to non-blocking mode.
    ///
    /// # Errors
    /// [`ChannelError::Io`] if the socket cannot be bound or configured.
    pub fn bind(addr: SocketAddr, config: ChannelConfig) -> Result<Self, ChannelError> {
        let socket =
            UdpSocket::bind(addr).map_err(|err| ChannelError::io("binding a udp socket", &err))?;
        socket
            .set_nonblocking(true)
            .map_err(|err| ChannelError::io("enabling non-blocking mode", &err))?;

        let mut rng = Pcg32::from_entropy();
        let mut magic = 0;
        while magic == 0 {
            let [high, low, _, _] = rng.next_u32().to_be_bytes();
            magic = u16::from_be_bytes([high, low]);
        }

        let now = Instant::now();
        Ok(Self {
            socket,
            config,
            advertised_ip: None,
            state: LinkState::Idle,
            magic,
            remote_magic: 0,
            last_send: now,
            last_recv: now,
            handlers: Handlers::default(),
            recv_buffer: [0; RECV_BUFFER_SIZE],
            send_buffer: [0; SEND_BUFFER_SIZE],
        })
    }

    /// Binds to `0.0.0.0:port`. Port 0 lets the OS choose.
    ///
    /// # Errors
    /// [`ChannelError::Io`] if the socket cannot be bound or configured.
    pub fn bind_to_port(port: u16, config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::bind(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            config,
        )
    }

    /// IP to put in the room token when the socket is bound to an
    /// unspecified address. Without it, loopback is advertised.
    #[must_use]
    pub fn with_advertised_ip(mut self, ip: IpAddr) -> Self {
        self.advertised_ip = Some(ip);
        self
    }

    /// The bound address.
    ///
    /// # Errors
    /// [`ChannelError::Io`] if the OS cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        self.socket
            .local_addr()
            .map_err(|err| ChannelError::io("reading the local address", &err))
    }

    /// Address of the connected (or handshaking) peer.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self.state {
            LinkState::Handshaking { peer, .. } | LinkState::Connected { peer } => Some(peer),
            LinkState::Idle | LinkState::Listening | LinkState::Closed => None,
        }
    }

    fn token(&self) -> Result<RoomToken, ChannelError> {
        let mut addr = self.local_addr()?;
        if addr.ip().is_unspecified() {
            addr.set_ip(
                self.advertised_ip
                    .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            );
        }
        Ok(RoomToken::new(addr.to_string()))
    }

    fn send_packet(&mut self, body: PacketBody, addr: SocketAddr) -> bool {
        let packet = Packet {
            magic: self.magic,
            body,
        };
        let len = match codec::encode_into(&packet, &mut self.send_buffer) {
            Ok(len) => len,
            Err(CodecError::BufferTooSmall { provided }) => {
                report_violation!(
                    ViolationSeverity::Warning,
                    ViolationKind::Channel,
                    "packet too large for the {} byte send buffer, falling back to allocation",
                    provided
                );
                return match codec::encode(&packet) {
                    Ok(buf) if buf.len() > RECV_BUFFER_SIZE => {
                        report_violation!(
                            ViolationSeverity::Error,
                            ViolationKind::Channel,
                            "{} byte packet exceeds the {} byte datagram limit, not sent",
                            buf.len(),
                            RECV_BUFFER_SIZE
                        );
                        false
                    },
                    Ok(buf) => self.send_bytes(&buf, addr),
                    Err(err) => {
                        report_violation!(
                            ViolationSeverity::Error,
                            ViolationKind::Channel,
                            "failed to encode packet: {}",
                            err
                        );
                        false
                    },
                };
            },
            Err(err) => {
                report_violation!(
                    ViolationSeverity::Error,
                    ViolationKind::Channel,
                    "failed to encode packet: {}",
                    err
                );
                return false;
            },
        };
        let Some(bytes) = self.send_buffer.get(..len) else {
            return false;
        };
        let sent = send_datagram(&self.socket, bytes, addr);
        if sent {
            self.last_send = Instant::now();
        }
        sent
    }

    fn send_bytes(&mut self, buf: &[u8], addr: SocketAddr) -> bool {
        let sent = send_datagram(&self.socket, buf, addr);
        if sent {
            self.last_send = Instant::now();
        }
        sent
    }

    fn receive_packets(&mut self) -> Vec<(SocketAddr, Packet)> {
        let mut received = Vec::with_capacity(4);
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((number_of_bytes, src_addr)) => {
                    let Some(bytes) = self.recv_buffer.get(..number_of_bytes) else {
                        report_violation!(
                            ViolationSeverity::Error,
                            ViolationKind::Channel,
                            "received {} bytes but the buffer holds {}",
                            number_of_bytes,
                            RECV_BUFFER_SIZE
                        );
                        continue;
                    };
                    match codec::decode_value::<Packet>(bytes) {
                        Ok(packet) => received.push((src_addr, packet)),
                        Err(err) => {
                            report_violation!(
                                ViolationSeverity::Warning,
                                ViolationKind::Channel,
                                "undecodable datagram from {}: {}",
                                src_addr,
                                err
                            );
                        },
                    }
                },
                // there are no more datagrams
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => return received,
                // datagram sockets sometimes report this after a send to a closed port
                Err(ref err) if err.kind() == ErrorKind::ConnectionReset => continue,
                Err(err) => {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::Channel,
                        "unexpected socket error: {:?}: {}",
                        err.kind(),
                        err
                    );
                    return received;
                },
            }
        }
    }

    fn handle_packet(&mut self, from: SocketAddr, packet: Packet, now: Instant) {
        match (self.state, packet.body) {
            (LinkState::Listening, PacketBody::Hello) => {
                self.remote_magic = packet.magic;
                self.last_recv = now;
                self.state = LinkState::Connected { peer: from };
                self.send_packet(PacketBody::Welcome, from);
                info!(peer = %from, "udp peer connected");
                self.handlers.connected();
            },
            (LinkState::Handshaking { peer, .. }, PacketBody::Welcome) if from == peer => {
                self.remote_magic = packet.magic;
                self.last_recv = now;
                self.state = LinkState::Connected { peer };
                info!(%peer, "udp handshake complete");
                self.handlers.connected();
            },
            (LinkState::Connected { peer }, body) => {
                if from != peer || packet.magic != self.remote_magic {
                    trace!(%from, magic = packet.magic, "datagram from another session ignored");
                    return;
                }
                self.last_recv = now;
                match body {
                    // our Welcome was lost
                    PacketBody::Hello => {
                        self.send_packet(PacketBody::Welcome, peer);
                    },
                    PacketBody::Welcome | PacketBody::KeepAlive => {},
                    PacketBody::Bye => {
                        info!(%peer, "udp peer said goodbye");
                        self.state = LinkState::Closed;
                        self.handlers.disconnected();
                    },
                    PacketBody::App(message) => {
                        trace!(kind = message.kind(), "udp message received");
                        self.handlers.message(message);
                    },
                }
            },
            (state, body) => {
                trace!(?state, ?body, %from, "datagram ignored");
            },
        }
    }

    fn update_timers(&mut self, now: Instant) {
        match self.state {
            LinkState::Handshaking {
                peer,
                started,
                last_hello,
            } => {
                let waited = now.duration_since(started);
                if waited > self.config.connect_timeout {
                    report_violation!(
                        ViolationSeverity::Warning,
                        ViolationKind::Channel,
                        "udp handshake with {} timed out after {}ms",
                        peer,
                        waited.as_millis()
                    );
                    self.state = LinkState::Closed;
                    return;
                }
                if now.duration_since(last_hello) >= self.config.handshake_retry_interval {
                    self.state = LinkState::Handshaking {
                        peer,
                        started,
                        last_hello: now,
                    };
                    debug!(%peer, "repeating hello");
                    self.send_packet(PacketBody::Hello, peer);
                }
            },
            LinkState::Connected { peer } => {
                if now.duration_since(self.last_recv) > self.config.peer_timeout {
                    warn!(%peer, "udp peer timed out");
                    self.state = LinkState::Closed;
                    self.handlers.disconnected();
                    return;
                }
                if now.duration_since(self.last_send) >= self.config.keepalive_interval {
                    self.send_packet(PacketBody::KeepAlive, peer);
                }
            },
            LinkState::Idle | LinkState::Listening | LinkState::Closed => {},
        }
    }
}

fn send_datagram(socket: &UdpSocket, buf: &[u8], addr: SocketAddr) -> bool {
    // Fragmented datagrams are lost more often, but the occasional one still gets through
    if buf.len() > IDEAL_MAX_UDP_PACKET_SIZE {
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::Channel,
            "sending a {} byte datagram, larger than the ideal {}",
            buf.len(),
            IDEAL_MAX_UDP_PACKET_SIZE
        );
    }
    if let Err(err) = socket.send_to(buf, addr) {
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::Channel,
            "failed to send a datagram to {}: {}",
            addr,
            err
        );
        return false;
    }
    true
}

impl Channel for UdpChannel {
    fn establish_as_initiator(&mut self) -> Result<RoomToken, ChannelError> {
        if self.state != LinkState::Idle {
            return Err(ChannelError::AlreadyEstablished);
        }
        let token = self.token()?;
        self.state = LinkState::Listening;
        info!(%token, "udp room opened");
        Ok(token)
    }

    fn establish_as_responder(&mut self, token: &RoomToken) -> Result<(), ChannelError> {
        if self.state != LinkState::Idle {
            return Err(ChannelError::AlreadyEstablished);
        }
        let peer: SocketAddr =
            token
                .as_str()
                .trim()
                .parse()
                .map_err(|err: std::net::AddrParseError| {
                    debug!(token = token.as_str(), %err, "room token is not a socket address");
                    ChannelError::InvalidRoomToken {
                        token: token.as_str().to_owned(),
                    }
                })?;
        let now = Instant::now();
        self.state = LinkState::Handshaking {
            peer,
            started: now,
            last_hello: now,
        };
        info!(%peer, "udp handshake started");
        self.send_packet(PacketBody::Hello, peer);
        Ok(())
    }

    fn send(&mut self, message: &Message) -> bool {
        let LinkState::Connected { peer } = self.state else {
            return false;
        };
        self.send_packet(PacketBody::App(message.clone()), peer)
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.handlers.set_message(handler);
    }

    fn on_connected(&mut self, handler: ConnectionHandler) {
        self.handlers.set_connected(handler);
    }

    fn on_disconnected(&mut self, handler: ConnectionHandler) {
        self.handlers.set_disconnected(handler);
    }

    fn poll(&mut self) {
        let now = Instant::now();
        for (from, packet) in self.receive_packets() {
            self.handle_packet(from, packet, now);
        }
        self.update_timers(now);
    }

    fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected { .. })
    }

    fn kind(&self) -> &'static str {
        "udp"
    }
}

impl Drop for UdpChannel {
    fn drop(&mut self) {
        if let LinkState::Connected { peer } = self.state {
            self.send_packet(PacketBody::Bye, peer);
        }
    }
}

impl std::fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpChannel")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("state", &self.state)
            .field("magic", &self.magic)
            .field("remote_magic", &self.remote_magic)
            .field("handlers", &self.handlers)
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
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn loopback(config: ChannelConfig) -> UdpChannel {
        UdpChannel::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0), config).unwrap()
    }

    #[track_caller]
    fn poll_until(a: &mut UdpChannel, b: &mut UdpChannel, mut done: impl FnMut(&UdpChannel, &UdpChannel) -> bool) {
        for _ in 0..200 {
            a.poll();
            b.poll();
            if done(a, b) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached: a={a:?} b={b:?}");
    }

    #[test]
    #[cfg(not(miri))] // Miri cannot execute foreign functions like socket()
    fn handshake_and_message_exchange() {
        let mut host = loopback(ChannelConfig::lan());
        let mut guest = loopback(ChannelConfig::lan());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        host.on_message(Box::new(move |message| sink.lock().push(message)));

        let token = host.establish_as_initiator().unwrap();
        assert_eq!(token.as_str(), host.local_addr().unwrap().to_string());
        guest.establish_as_responder(&token).unwrap();
        poll_until(&mut host, &mut guest, |h, g| h.is_connected() && g.is_connected());

        let joined = Message::GuestJoined {
            guest_name: "Brook".to_owned(),
        };
        assert!(guest.send(&joined));
        poll_until(&mut host, &mut guest, |_, _| !received.lock().is_empty());
        assert_eq!(received.lock().as_slice(), &[joined]);
        assert_eq!(host.peer_addr(), Some(guest.local_addr().unwrap()));
    }

    #[test]
    #[cfg(not(miri))]
    fn datagrams_beyond_the_receive_buffer_are_refused() {
        let mut host = loopback(ChannelConfig::lan());
        let mut guest = loopback(ChannelConfig::lan());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        guest.on_message(Box::new(move |message| sink.lock().push(message)));
        let token = host.establish_as_initiator().unwrap();
        guest.establish_as_responder(&token).unwrap();
        poll_until(&mut host, &mut guest, |h, g| h.is_connected() && g.is_connected());

        let item = |fun_fact: String| crate::catalog::InventionFact::new("Loom", -5000, fun_fact);
        let start = |fun_fact: String| Message::GameStart {
            game: 1,
            item: item(fun_fact),
            host_name: "Ada".to_owned(),
            guest_name: "Brook".to_owned(),
            total_rounds: 3,
        };
        // Larger than the send buffer but still one readable datagram
        let medium = start("w".repeat(2000));
        assert!(host.send(&medium));
        assert!(!host.send(&start("w".repeat(RECV_BUFFER_SIZE + 1))));

        poll_until(&mut host, &mut guest, |_, _| !received.lock().is_empty());
        std::thread::sleep(Duration::from_millis(20));
        guest.poll();
        assert_eq!(received.lock().as_slice(), &[medium]);
        assert!(host.is_connected());
    }

    #[test]
    #[cfg(not(miri))]
    fn unspecified_bind_advertises_loopback() {
        let mut channel = UdpChannel::bind_to_port(0, ChannelConfig::lan()).unwrap();
        let token = channel.establish_as_initiator().unwrap();
        assert!(token.as_str().starts_with("127.0.0.1:"), "{token}");
    }

    #[test]
    #[cfg(not(miri))]
    fn malformed_token_is_rejected() {
        let mut channel = loopback(ChannelConfig::lan());
        let err = channel
            .establish_as_responder(&RoomToken::from("ABC123"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidRoomToken { .. }));
        assert!(!channel.send(&Message::Reset { game: 1 }));
    }

    #[test]
    #[cfg(not(miri))]
    fn handshake_times_out_without_an_initiator() {
        let config = ChannelConfig {
            connect_timeout: Duration::from_millis(30),
            handshake_retry_interval: Duration::from_millis(5),
            ..ChannelConfig::lan()
        };
        let silent = loopback(config);
        let mut guest = loopback(config);
        guest
            .establish_as_responder(&RoomToken::new(silent.local_addr().unwrap().to_string()))
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        guest.poll();
        assert!(!guest.is_connected());
        assert_eq!(guest.peer_addr(), None);
    }

    #[test]
    #[cfg(not(miri))]
    fn dropping_the_peer_sends_bye() {
        let mut host = loopback(ChannelConfig::lan());
        let mut guest = loopback(ChannelConfig::lan());
        let token = host.establish_as_initiator().unwrap();
        guest.establish_as_responder(&token).unwrap();
        poll_until(&mut host, &mut guest, |h, g| h.is_connected() && g.is_connected());

        let gone = Arc::new(Mutex::new(false));
        let flag = gone.clone();
        host.on_disconnected(Box::new(move || *flag.lock() = true));
        drop(guest);
        for _ in 0..200 {
            host.poll();
            if *gone.lock() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(*gone.lock());
        assert!(!host.is_connected());
    }

    #[test]
    #[cfg(not(miri))]
    fn garbage_datagrams_are_ignored() {
        let mut host = loopback(ChannelConfig::lan());
        let received = Arc::new(Mutex::new(0_usize));
        let count = received.clone();
        host.on_message(Box::new(move |_| *count.lock() += 1));
        host.establish_as_initiator().unwrap();

        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&[0xFF; 16], host.local_addr().unwrap()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        host.poll();
        assert_eq!(*received.lock(), 0);
        assert!(!host.is_connected());
    }
}
