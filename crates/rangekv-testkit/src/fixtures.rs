//! Test fixtures and helpers.
//!
//! A mock tracker and a UDP client for driving real nodes on loopback.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use rangekv_core::{KeyHasher, NodeAddr, RecordId, RecordValue, RECORD_ID_LEN};
use rangekv_net::{Frames, Pdu, TransportConfig};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Transport settings for nodes bound to loopback.
pub fn local_transport() -> TransportConfig {
    TransportConfig {
        bind_ip: Ipv4Addr::LOCALHOST,
        write_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
        ..TransportConfig::default()
    }
}

/// Places a record at the key-space position given by its first byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstByteHasher;

impl KeyHasher for FirstByteHasher {
    fn position(&self, id: &RecordId) -> u8 {
        id.as_bytes()[0]
    }
}

/// A random id that [`FirstByteHasher`] places at `position`.
pub fn id_at(position: u8) -> RecordId {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; RECORD_ID_LEN];
    bytes[0] = position;
    for byte in &mut bytes[1..] {
        *byte = rng.gen_range(b'0'..=b'9');
    }
    RecordId::from_bytes(bytes)
}

/// A record value derived from `name`.
pub fn person(name: &str) -> RecordValue {
    RecordValue::new(name.to_owned(), format!("{}@example.org", name.to_lowercase()))
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracker
// ─────────────────────────────────────────────────────────────────────────────

/// An in-process tracker on loopback.
///
/// Answers `STUN_LOOKUP` with the sender's address and `NET_GET_NODE` with
/// the first node that reported `NET_ALIVE` (other than the asker). The
/// task stops when the tracker is dropped.
pub struct MockTracker {
    addr: SocketAddrV4,
    members: Arc<Mutex<Vec<SocketAddrV4>>>,
    shutdown: CancellationToken,
}

impl MockTracker {
    pub async fn spawn() -> io::Result<Self> {
        Self::spawn_with(false).await
    }

    /// A tracker that answers `NET_GET_NODE` with the asker itself, as one
    /// holding a stale entry for a restarted node would.
    pub async fn spawn_offering_asker() -> io::Result<Self> {
        Self::spawn_with(true).await
    }

    async fn spawn_with(offer_asker: bool) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, socket.local_addr()?.port());
        let members = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(serve_tracker(
            socket,
            members.clone(),
            offer_asker,
            shutdown.clone(),
        ));
        Ok(Self {
            addr,
            members,
            shutdown,
        })
    }

    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    /// UDP addresses of the nodes that reported liveness, oldest first.
    pub fn members(&self) -> Vec<SocketAddrV4> {
        lock(&self.members).clone()
    }

    /// Stop handing out `member`.
    pub fn forget(&self, member: SocketAddrV4) {
        lock(&self.members).retain(|known| *known != member);
    }

    /// Wait until at least `count` nodes have reported liveness.
    pub async fn wait_for_members(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if lock(&self.members).len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockTracker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn serve_tracker(
    socket: UdpSocket,
    members: Arc<Mutex<Vec<SocketAddrV4>>>,
    offer_asker: bool,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; 2048];
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => return,
            res = socket.recv_from(&mut buf) => res,
        };
        let (n, from) = match received {
            Ok((n, SocketAddr::V4(from))) => (n, from),
            Ok(_) => continue,
            Err(err) => {
                debug!(error = %err, "tracker recv failed");
                continue;
            }
        };

        for frame in Frames::new(&buf[..n]) {
            let Ok(pdu) = frame else { break };
            let reply = match pdu {
                Pdu::StunLookup => Some(Pdu::StunResponse { addr: *from.ip() }),
                Pdu::NetAlive => {
                    let mut members = lock(&members);
                    if !members.contains(&from) {
                        members.push(from);
                    }
                    None
                }
                Pdu::NetGetNode if offer_asker => Some(Pdu::NetGetNodeResponse {
                    member: NodeAddr::from(from),
                }),
                Pdu::NetGetNode => {
                    let member = lock(&members)
                        .iter()
                        .copied()
                        .find(|member| *member != from)
                        .map(NodeAddr::from)
                        .unwrap_or(NodeAddr::UNSPECIFIED);
                    Some(Pdu::NetGetNodeResponse { member })
                }
                _ => None,
            };
            if let Some(reply) = reply {
                if let Err(err) = socket.send_to(&reply.encode(), from).await {
                    debug!(error = %err, "tracker send failed");
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Sends value requests to nodes over UDP.
pub struct TestClient {
    socket: UdpSocket,
    addr: NodeAddr,
}

impl TestClient {
    pub async fn bind() -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = NodeAddr::new(Ipv4Addr::LOCALHOST, socket.local_addr()?.port());
        Ok(Self { socket, addr })
    }

    /// Where lookup responses are sent.
    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    pub async fn insert(
        &self,
        node: SocketAddrV4,
        id: RecordId,
        value: RecordValue,
    ) -> io::Result<()> {
        self.send(node, &Pdu::ValInsert { id, value }).await
    }

    pub async fn remove(&self, node: SocketAddrV4, id: RecordId) -> io::Result<()> {
        self.send(node, &Pdu::ValRemove { id }).await
    }

    /// Look `id` up through `node` and wait for the owner's answer.
    ///
    /// `None` if no answer arrives within `timeout`. An absent record is
    /// answered with empty fields.
    pub async fn lookup(
        &self,
        node: SocketAddrV4,
        id: RecordId,
        timeout: Duration,
    ) -> io::Result<Option<RecordValue>> {
        self.send(
            node,
            &Pdu::ValLookup {
                id,
                reply_to: self.addr,
            },
        )
        .await?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = vec![0u8; 2048];
        loop {
            let n = match tokio::time::timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Err(_) => return Ok(None),
                Ok(res) => res?,
            };
            let (pdu, _) = Pdu::decode(&buf[..n])
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            match pdu {
                Pdu::ValLookupResponse { id: answered, value } if answered == id => {
                    return Ok(Some(value))
                }
                other => debug!(pdu = other.name(), "ignoring unrelated reply"),
            }
        }
    }

    /// Poll `lookup` until the record reads back as `expected`.
    pub async fn await_value(
        &self,
        node: SocketAddrV4,
        id: RecordId,
        expected: &RecordValue,
        timeout: Duration,
    ) -> io::Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if let Some(value) = self.lookup(node, id, Duration::from_millis(200)).await? {
                if &value == expected {
                    return Ok(true);
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(false)
    }

    async fn send(&self, node: SocketAddrV4, pdu: &Pdu) -> io::Result<()> {
        self.socket.send_to(&pdu.encode(), node).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_at_places_record() {
        let hasher = FirstByteHasher;
        for position in [0u8, 127, 128, 255] {
            assert_eq!(hasher.position(&id_at(position)), position);
        }
    }

    #[test]
    fn test_person() {
        let value = person("Ada");
        assert_eq!(value.name().as_ref(), b"Ada");
        assert_eq!(value.email().as_ref(), b"ada@example.org");
    }

    #[tokio::test]
    async fn test_tracker_stun_and_rendezvous() {
        let tracker = MockTracker::spawn().await.unwrap();
        let node = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];

        node.send_to(&Pdu::StunLookup.encode(), tracker.addr()).await.unwrap();
        let n = node.recv(&mut buf).await.unwrap();
        assert_eq!(
            Pdu::decode(&buf[..n]).unwrap().0,
            Pdu::StunResponse { addr: Ipv4Addr::LOCALHOST }
        );

        node.send_to(&Pdu::NetGetNode.encode(), tracker.addr()).await.unwrap();
        let n = node.recv(&mut buf).await.unwrap();
        assert_eq!(
            Pdu::decode(&buf[..n]).unwrap().0,
            Pdu::NetGetNodeResponse { member: NodeAddr::UNSPECIFIED }
        );

        node.send_to(&Pdu::NetAlive.encode(), tracker.addr()).await.unwrap();
        assert!(tracker.wait_for_members(1, Duration::from_secs(2)).await);

        let other = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        other.send_to(&Pdu::NetGetNode.encode(), tracker.addr()).await.unwrap();
        let n = other.recv(&mut buf).await.unwrap();
        let SocketAddr::V4(expected) = node.local_addr().unwrap() else {
            panic!("loopback socket is IPv4");
        };
        assert_eq!(
            Pdu::decode(&buf[..n]).unwrap().0,
            Pdu::NetGetNodeResponse { member: NodeAddr::from(expected) }
        );
    }

    #[tokio::test]
    async fn test_tracker_offering_asker() {
        let tracker = MockTracker::spawn_offering_asker().await.unwrap();
        let node = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];

        node.send_to(&Pdu::NetGetNode.encode(), tracker.addr()).await.unwrap();
        let n = node.recv(&mut buf).await.unwrap();
        let SocketAddr::V4(own) = node.local_addr().unwrap() else {
            panic!("loopback socket is IPv4");
        };
        assert_eq!(
            Pdu::decode(&buf[..n]).unwrap().0,
            Pdu::NetGetNodeResponse { member: NodeAddr::from(own) }
        );
    }
}
