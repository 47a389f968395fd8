//! Socket multiplexer for a single node.
//!
//! A node talks through exactly four sockets:
//!
//! - **Tracker** - one UDP socket for tracker traffic and client value requests
//! - **Successor** - outbound TCP link to the next node of the ring
//! - **Predecessor** - inbound TCP link from the previous node
//! - **Listening** - TCP listener the predecessor connects to
//!
//! Everything runs on one task. [`Multiplexer::poll_readable`] waits until
//! at least one of the UDP socket and the two links has data, then reports
//! every slot that is ready; [`Multiplexer::recv`] drains one read from a
//! slot without blocking and returns the PDUs it completed. Each link keeps
//! a [`FrameBuffer`], so a PDU split across reads is delivered once whole.
//! The synchronous phases of the protocol use the
//! bounded [`Multiplexer::recv_blocking`] and the unbounded
//! [`Multiplexer::accept_predecessor`] instead.

use std::fmt;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

use crate::error::{DecodeError, Result, TransportError};
use crate::pdu::{FrameBuffer, Frames, Pdu};

/// One of the node's four sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Tracker,
    Successor,
    Predecessor,
    Listening,
}

impl Slot {
    /// Slots reported by [`Multiplexer::poll_readable`].
    pub const POLLED: [Slot; 3] = [Slot::Tracker, Slot::Successor, Slot::Predecessor];

    const fn bit(self) -> u8 {
        match self {
            Slot::Tracker => 1,
            Slot::Successor => 1 << 1,
            Slot::Predecessor => 1 << 2,
            Slot::Listening => 1 << 3,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::Tracker => "tracker socket",
            Slot::Successor => "successor link",
            Slot::Predecessor => "predecessor link",
            Slot::Listening => "listening socket",
        })
    }
}

/// Set of slots with pending input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadySet(u8);

impl ReadySet {
    pub const EMPTY: Self = Self(0);

    pub fn insert(&mut self, slot: Slot) {
        self.0 |= slot.bit();
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.0 & slot.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Ready slots in polling order.
    pub fn iter(self) -> impl Iterator<Item = Slot> {
        Slot::POLLED.into_iter().filter(move |slot| self.contains(*slot))
    }
}

/// Outcome of a non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// PDUs completed by one read, in arrival order.
    ///
    /// `error` is set when a malformed PDU cut the read short. On the UDP
    /// slot only the rest of that datagram is lost. On a link the stream can
    /// no longer be framed and the caller should drop the link.
    Pdus {
        pdus: Vec<Pdu>,
        error: Option<DecodeError>,
    },
    /// The peer closed the link. The slot is now disconnected.
    Closed,
    /// Readiness was spurious, nothing to read.
    Idle,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local address both the UDP socket and the listener bind to.
    pub bind_ip: Ipv4Addr,
    /// How long a TCP send may wait for the peer to drain.
    pub write_timeout: Duration,
    /// How long an outbound connect may take.
    pub connect_timeout: Duration,
    /// Size of the receive buffer; bounds a single read, not a PDU.
    pub read_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED,
            write_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            read_buffer: 64 * 1024,
        }
    }
}

struct Link {
    stream: TcpStream,
    frames: FrameBuffer,
}

impl Link {
    fn new(stream: TcpStream, remote: SocketAddr) -> Self {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%remote, error = %err, "could not disable Nagle");
        }
        Self {
            stream,
            frames: FrameBuffer::new(),
        }
    }

    /// Take every complete PDU out of the reassembly buffer.
    fn drain(&mut self) -> Inbound {
        let mut pdus = Vec::new();
        loop {
            match self.frames.next_pdu() {
                Ok(Some(pdu)) => pdus.push(pdu),
                Ok(None) => return Inbound::pdus(pdus, None),
                Err(err) => return Inbound::pdus(pdus, Some(err)),
            }
        }
    }
}

impl Inbound {
    fn pdus(pdus: Vec<Pdu>, error: Option<DecodeError>) -> Self {
        if pdus.is_empty() && error.is_none() {
            Inbound::Idle
        } else {
            Inbound::Pdus { pdus, error }
        }
    }
}

/// The node's four sockets.
pub struct Multiplexer {
    config: TransportConfig,
    udp: UdpSocket,
    listener: TcpListener,
    successor: Option<Link>,
    predecessor: Option<Link>,
    buf: Vec<u8>,
}

impl Multiplexer {
    /// Bind the UDP socket and the listener on ephemeral ports.
    pub async fn bind(config: TransportConfig) -> Result<Self> {
        let local = SocketAddrV4::new(config.bind_ip, 0);
        let udp = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind { what: "UDP socket", source })?;
        let listener = TcpListener::bind(local)
            .await
            .map_err(|source| TransportError::Bind { what: "TCP listener", source })?;
        let buf = vec![0u8; config.read_buffer];

        Ok(Self {
            config,
            udp,
            listener,
            successor: None,
            predecessor: None,
            buf,
        })
    }

    pub fn udp_port(&self) -> Result<u16> {
        self.udp
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|source| TransportError::Io { slot: Slot::Tracker, source })
    }

    pub fn listen_port(&self) -> Result<u16> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|source| TransportError::Io { slot: Slot::Listening, source })
    }

    pub fn is_connected(&self, slot: Slot) -> bool {
        self.link(slot).is_some()
    }

    fn link(&self, slot: Slot) -> Option<&Link> {
        match slot {
            Slot::Successor => self.successor.as_ref(),
            Slot::Predecessor => self.predecessor.as_ref(),
            Slot::Tracker | Slot::Listening => None,
        }
    }

    fn link_mut(&mut self, slot: Slot) -> Option<&mut Link> {
        match slot {
            Slot::Successor => self.successor.as_mut(),
            Slot::Predecessor => self.predecessor.as_mut(),
            Slot::Tracker | Slot::Listening => None,
        }
    }

    /// A link together with the receive buffer, borrowed apart.
    fn link_with_buf(&mut self, slot: Slot) -> Option<(&mut Link, &mut [u8])> {
        let link = match slot {
            Slot::Successor => self.successor.as_mut(),
            Slot::Predecessor => self.predecessor.as_mut(),
            Slot::Tracker | Slot::Listening => None,
        }?;
        Some((link, self.buf.as_mut_slice()))
    }

    /// Links whose reassembly buffer already holds a complete PDU.
    fn buffered_ready(&self) -> ReadySet {
        let mut ready = ReadySet::EMPTY;
        for slot in [Slot::Successor, Slot::Predecessor] {
            if self.link(slot).is_some_and(|link| link.frames.is_ready()) {
                ready.insert(slot);
            }
        }
        ready
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait until the UDP socket or a link has input, at most `timeout`.
    ///
    /// Returns every ready slot. An empty set means the timeout elapsed or
    /// `cancel` fired. Disconnected links are never reported. A link with a
    /// complete PDU already buffered is ready without touching the socket.
    pub async fn poll_readable(
        &self,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<ReadySet> {
        let mut ready = self.buffered_ready();
        if ready.is_empty() {
            let cancelled = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancelled => return Ok(ReadySet::EMPTY),
                res = self.readable(Slot::Tracker) => res?,
                res = self.readable(Slot::Successor) => res?,
                res = self.readable(Slot::Predecessor) => res?,
                _ = tokio::time::sleep(timeout) => return Ok(ReadySet::EMPTY),
            }
        }

        for slot in Slot::POLLED {
            if self.probe(slot).await? {
                ready.insert(slot);
            }
        }
        Ok(ready)
    }

    async fn readable(&self, slot: Slot) -> Result<()> {
        let res = match slot {
            Slot::Tracker => self.udp.readable().await,
            Slot::Successor | Slot::Predecessor => match self.link(slot) {
                Some(link) => link.stream.readable().await,
                None => std::future::pending().await,
            },
            Slot::Listening => std::future::pending().await,
        };
        res.map_err(|source| TransportError::Io { slot, source })
    }

    /// Readiness check that does not wait.
    async fn probe(&self, slot: Slot) -> Result<bool> {
        match tokio::time::timeout(Duration::ZERO, self.readable(slot)).await {
            Ok(res) => res.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Receiving
    // ─────────────────────────────────────────────────────────────────────────

    /// Read whatever a ready slot holds without waiting.
    ///
    /// A zero-byte read or a reset on a link disconnects that slot and
    /// returns [`Inbound::Closed`], once every PDU it completed has been
    /// handed out.
    pub fn recv(&mut self, slot: Slot) -> Result<Inbound> {
        match slot {
            Slot::Tracker => self.recv_datagram(),
            Slot::Successor | Slot::Predecessor => self.recv_link(slot),
            Slot::Listening => Ok(Inbound::Idle),
        }
    }

    fn recv_datagram(&mut self) -> Result<Inbound> {
        match self.udp.try_recv_from(&mut self.buf) {
            Ok((n, from)) => {
                tracing::trace!(%from, len = n, "datagram");
                let mut pdus = Vec::new();
                let mut error = None;
                for frame in Frames::new(&self.buf[..n]) {
                    match frame {
                        Ok(pdu) => pdus.push(pdu),
                        Err(err) => error = Some(err),
                    }
                }
                Ok(Inbound::pdus(pdus, error))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(Inbound::Idle),
            // ICMP errors from earlier datagrams surface on the next UDP read.
            Err(err) if is_icmp_echo(&err) => {
                tracing::debug!(error = %err, "ignoring UDP error");
                Ok(Inbound::Idle)
            }
            Err(source) => Err(TransportError::Io { slot: Slot::Tracker, source }),
        }
    }

    fn recv_link(&mut self, slot: Slot) -> Result<Inbound> {
        let (link, buf) = self
            .link_with_buf(slot)
            .ok_or(TransportError::NotConnected(slot))?;

        match link.stream.try_read(buf) {
            Ok(0) if !link.frames.is_ready() => {
                let dropped = link.frames.buffered();
                if dropped > 0 {
                    tracing::debug!(%slot, dropped, "link closed mid-PDU");
                }
                self.close(slot);
                return Ok(Inbound::Closed);
            }
            Ok(0) => {}
            Ok(n) => link.frames.extend(&buf[..n]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) if err.kind() == ErrorKind::ConnectionReset => {
                tracing::warn!(%slot, "connection reset by peer");
                self.close(slot);
                return Ok(Inbound::Closed);
            }
            Err(source) => return Err(TransportError::Io { slot, source }),
        }
        Ok(link.drain())
    }

    /// Wait at most `timeout` for input on one slot.
    ///
    /// On the UDP slot one datagram is returned whole. On a link exactly
    /// `len` bytes are returned; anything the peer sent after them stays in
    /// the link's reassembly buffer for the main loop.
    pub async fn recv_blocking(
        &mut self,
        slot: Slot,
        len: usize,
        timeout: Duration,
    ) -> Result<Bytes> {
        if slot == Slot::Tracker {
            let received = tokio::time::timeout(timeout, self.udp.recv_from(&mut self.buf)).await;
            return match received {
                Err(_) => Err(TransportError::Timeout { slot, waited: timeout }),
                Ok(Err(source)) => Err(TransportError::Io { slot, source }),
                Ok(Ok((n, _))) => Ok(Bytes::copy_from_slice(&self.buf[..n])),
            };
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let (link, buf) = self
                .link_with_buf(slot)
                .ok_or(TransportError::NotConnected(slot))?;
            if let Some(bytes) = link.frames.take(len) {
                return Ok(bytes);
            }
            let read = tokio::time::timeout_at(deadline, link.stream.read(buf)).await;
            match read {
                Err(_) => return Err(TransportError::Timeout { slot, waited: timeout }),
                Ok(Ok(0)) => {
                    self.close(slot);
                    return Err(TransportError::PeerClosed(slot));
                }
                Ok(Ok(n)) => link.frames.extend(&buf[..n]),
                Ok(Err(source)) => return Err(TransportError::Io { slot, source }),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn send_udp(&self, dest: SocketAddrV4, bytes: &[u8]) -> Result<()> {
        self.udp
            .send_to(bytes, dest)
            .await
            .map(|_| ())
            .map_err(|source| TransportError::Io { slot: Slot::Tracker, source })
    }

    /// Write all of `bytes` to a link, waiting at most the write timeout.
    pub async fn send_tcp(&mut self, slot: Slot, bytes: &[u8]) -> Result<()> {
        let write_timeout = self.config.write_timeout;
        let link = self
            .link_mut(slot)
            .ok_or(TransportError::NotConnected(slot))?;

        match tokio::time::timeout(write_timeout, link.stream.write_all(bytes)).await {
            Err(_) => Err(TransportError::WriteTimeout(slot)),
            Ok(Err(err))
                if matches!(err.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) =>
            {
                Err(TransportError::BrokenPipe(slot))
            }
            Ok(Err(source)) => Err(TransportError::Io { slot, source }),
            Ok(Ok(())) => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Link management
    // ─────────────────────────────────────────────────────────────────────────

    /// Open the successor link, replacing any existing one.
    pub async fn connect_successor(&mut self, addr: SocketAddrV4) -> Result<()> {
        let stream = match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
        {
            Err(_) => return Err(TransportError::ConnectTimeout(addr)),
            Ok(Err(source)) => return Err(TransportError::Connect { addr, source }),
            Ok(Ok(stream)) => stream,
        };
        self.successor = Some(Link::new(stream, SocketAddr::V4(addr)));
        Ok(())
    }

    /// Block until a node connects to the listener and install it as the
    /// predecessor link.
    ///
    /// Returns `None` if `cancel` fires first.
    pub async fn accept_predecessor(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<SocketAddr>> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                res = self.listener.accept() => res,
            };
            match accepted {
                Ok((stream, peer)) => {
                    self.predecessor = Some(Link::new(stream, peer));
                    return Ok(Some(peer));
                }
                Err(err) if is_transient_accept(&err) => {
                    tracing::debug!(error = %err, "retrying accept");
                }
                Err(source) => {
                    return Err(TransportError::Io { slot: Slot::Listening, source });
                }
            }
        }
    }

    /// Drop a link. The UDP socket and the listener live as long as the
    /// multiplexer.
    pub fn close(&mut self, slot: Slot) {
        match slot {
            Slot::Successor => self.successor = None,
            Slot::Predecessor => self.predecessor = None,
            Slot::Tracker | Slot::Listening => {}
        }
    }

    pub fn close_all(&mut self) {
        self.close(Slot::Successor);
        self.close(Slot::Predecessor);
    }
}

fn is_icmp_echo(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}

fn is_transient_accept(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
