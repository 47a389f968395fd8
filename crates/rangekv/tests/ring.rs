//! End-to-end tests: real nodes on loopback against a mock tracker.
//!
//! Records are placed with [`FirstByteHasher`], so an id built by `id_at(p)`
//! lives at key-space position `p`.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use rangekv::core::{KeyRange, RecordId, RecordValue};
use rangekv::store::MemoryStore;
use rangekv::{Node, NodeConfig, NodeStatus, Phase};
use rangekv_testkit::{id_at, local_transport, person, FirstByteHasher, MockTracker, TestClient};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(10);

/// A node running on its own task.
struct Running {
    status: watch::Receiver<NodeStatus>,
    shutdown: CancellationToken,
    task: JoinHandle<rangekv::Result<()>>,
    udp: SocketAddrV4,
}

impl Running {
    async fn start(tracker: &MockTracker) -> Self {
        Self::start_lingering(tracker, Duration::from_millis(100)).await
    }

    /// Start a node that keeps serving for `leave_grace` after handing its
    /// range over.
    async fn start_lingering(tracker: &MockTracker, leave_grace: Duration) -> Self {
        let config = NodeConfig::new(tracker.addr())
            .with_poll_interval(Duration::from_millis(50))
            .with_bootstrap_timeout(Duration::from_secs(2))
            .with_leave_grace(leave_grace)
            .with_transport(local_transport());
        let shutdown = CancellationToken::new();
        let node = Node::bind(config, MemoryStore::new(), FirstByteHasher, shutdown.clone())
            .await
            .unwrap();

        Self {
            status: node.status(),
            shutdown,
            udp: SocketAddrV4::new(Ipv4Addr::LOCALHOST, node.udp_port()),
            task: tokio::spawn(node.run()),
        }
    }

    /// Start a node and wait until it serves `range`.
    async fn start_owning(tracker: &MockTracker, start: u8, end: u8) -> Self {
        let mut node = Self::start(tracker).await;
        node.wait_for_range(start, end).await;
        node
    }

    async fn wait_until(
        &mut self,
        what: &str,
        pred: impl FnMut(&NodeStatus) -> bool,
    ) -> NodeStatus {
        let reached = match tokio::time::timeout(TIMEOUT, self.status.wait_for(pred)).await {
            Ok(Ok(status)) => Some(status.clone()),
            _ => None,
        };
        reached.unwrap_or_else(|| {
            panic!("timed out waiting for {what}: {:?}", *self.status.borrow())
        })
    }

    async fn wait_for_range(&mut self, start: u8, end: u8) -> NodeStatus {
        let expected = KeyRange::new(start, end).unwrap();
        self.wait_until(&format!("range {expected}"), |status| {
            status.is_serving() && status.range == Some(expected)
        })
        .await
    }

    async fn wait_linked(&mut self) -> NodeStatus {
        self.wait_until("both ring links", |status| {
            status.has_predecessor && status.has_successor
        })
        .await
    }

    async fn wait_unlinked(&mut self) -> NodeStatus {
        self.wait_until("no ring links", |status| {
            !status.has_predecessor && !status.has_successor
        })
        .await
    }

    /// Cancel the node and wait for it to leave.
    async fn stop(self) -> rangekv::Result<()> {
        self.shutdown.cancel();
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("node did not stop")
            .expect("node task panicked")
    }
}

async fn first_node(tracker: &MockTracker) -> Running {
    let node = Running::start_owning(tracker, 0, 255).await;
    assert!(tracker.wait_for_members(1, TIMEOUT).await);
    node
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_first_node_owns_everything() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;

    let status = a.wait_for_range(0, 255).await;
    assert_eq!(status.address.ip, Ipv4Addr::LOCALHOST);
    assert!(!status.has_predecessor);
    assert!(!status.has_successor);

    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_node_value_operations() {
    let tracker = MockTracker::spawn().await.unwrap();
    let a = first_node(&tracker).await;
    let client = TestClient::bind().await.unwrap();
    let id = id_at(42);

    // Absent ids are answered with empty fields.
    let absent = client.lookup(a.udp, id, TIMEOUT).await.unwrap().unwrap();
    assert!(absent.is_empty());

    client.insert(a.udp, id, person("Ada")).await.unwrap();
    assert!(client.await_value(a.udp, id, &person("Ada"), TIMEOUT).await.unwrap());

    // Insert replaces.
    client.insert(a.udp, id, person("Grace")).await.unwrap();
    assert!(client.await_value(a.udp, id, &person("Grace"), TIMEOUT).await.unwrap());

    client.remove(a.udp, id).await.unwrap();
    let empty = Default::default();
    assert!(client.await_value(a.udp, id, &empty, TIMEOUT).await.unwrap());

    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_node_gets_upper_half() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;
    let client = TestClient::bind().await.unwrap();

    let low = id_at(10);
    let high = id_at(200);
    client.insert(a.udp, low, person("Low")).await.unwrap();
    client.insert(a.udp, high, person("High")).await.unwrap();
    a.wait_until("two records", |status| status.records == 2).await;

    let mut b = Running::start_owning(&tracker, 128, 255).await;
    a.wait_for_range(0, 127).await;
    a.wait_linked().await;
    b.wait_linked().await;

    // The record in the ceded half moved with it.
    b.wait_until("handed-over record", |status| status.records == 1).await;
    a.wait_until("one record left", |status| status.records == 1).await;

    // Requests reach the owner whichever node they enter through.
    assert!(client.await_value(a.udp, high, &person("High"), TIMEOUT).await.unwrap());
    assert!(client.await_value(b.udp, low, &person("Low"), TIMEOUT).await.unwrap());

    let fresh = id_at(250);
    client.insert(a.udp, fresh, person("Fresh")).await.unwrap();
    b.wait_until("forwarded insert", |status| status.records == 2).await;
    assert!(client.await_value(b.udp, fresh, &person("Fresh"), TIMEOUT).await.unwrap());

    b.stop().await.unwrap();
    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_hand_off_spans_many_reads() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;
    let client = TestClient::bind().await.unwrap();

    // 400 maximal records, far more than one read of the receive buffer.
    let value = RecordValue::new(vec![b'n'; 255], vec![b'e'; 255]).unwrap();
    let ids: Vec<RecordId> = (0..400u16).map(|i| id_at(128 + (i % 128) as u8)).collect();
    for (batch, chunk) in ids.chunks(50).enumerate() {
        for id in chunk {
            client.insert(a.udp, *id, value.clone()).await.unwrap();
        }
        let stored = (batch + 1) * 50;
        a.wait_until("batch stored", |status| status.records == stored).await;
    }

    let mut b = Running::start_owning(&tracker, 128, 255).await;
    b.wait_until("every record handed over", |status| status.records == ids.len())
        .await;
    a.wait_until("nothing left behind", |status| status.records == 0).await;
    b.wait_linked().await;

    for id in [ids[0], ids[199], ids[399]] {
        assert!(client.await_value(a.udp, id, &value, TIMEOUT).await.unwrap());
    }

    b.stop().await.unwrap();
    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_node_offered_itself_seeds_the_ring() {
    let tracker = MockTracker::spawn_offering_asker().await.unwrap();
    let mut a = Running::start_owning(&tracker, 0, 255).await;

    let status = a.wait_for_range(0, 255).await;
    assert!(!status.has_predecessor);
    assert!(!status.has_successor);

    let client = TestClient::bind().await.unwrap();
    let id = id_at(77);
    client.insert(a.udp, id, person("Solo")).await.unwrap();
    assert!(client.await_value(a.udp, id, &person("Solo"), TIMEOUT).await.unwrap());

    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_third_node_splits_widest_range() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;
    let mut b = Running::start_owning(&tracker, 128, 255).await;
    a.wait_for_range(0, 127).await;
    b.wait_linked().await;

    // Both ranges are equally wide; the join is split by the node it
    // entered through.
    let mut c = Running::start_owning(&tracker, 64, 127).await;
    a.wait_for_range(0, 63).await;
    for node in [&mut a, &mut b, &mut c] {
        node.wait_linked().await;
    }

    let client = TestClient::bind().await.unwrap();
    let id = id_at(100);
    client.insert(b.udp, id, person("Middle")).await.unwrap();
    c.wait_until("record forwarded twice", |status| status.records == 1).await;
    assert!(client.await_value(a.udp, id, &person("Middle"), TIMEOUT).await.unwrap());

    c.stop().await.unwrap();
    b.stop().await.unwrap();
    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leaving_node_hands_range_to_predecessor() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;
    let b = Running::start_owning(&tracker, 128, 255).await;
    a.wait_for_range(0, 127).await;
    a.wait_linked().await;

    let client = TestClient::bind().await.unwrap();
    let id = id_at(200);
    client.insert(a.udp, id, person("Kept")).await.unwrap();
    assert!(client.await_value(a.udp, id, &person("Kept"), TIMEOUT).await.unwrap());

    tracker.forget(b.udp);
    b.stop().await.unwrap();

    a.wait_for_range(0, 255).await;
    a.wait_until("handed-over record", |status| status.records == 1).await;
    a.wait_unlinked().await;
    assert!(client.await_value(a.udp, id, &person("Kept"), TIMEOUT).await.unwrap());

    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inserts_during_leave_reach_donee() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;
    let mut b = Running::start_lingering(&tracker, Duration::from_secs(1)).await;
    b.wait_for_range(128, 255).await;
    a.wait_for_range(0, 127).await;
    a.wait_linked().await;

    let client = TestClient::bind().await.unwrap();
    let early: Vec<RecordId> = (0..10).map(|i| id_at(200 + i)).collect();
    let late: Vec<RecordId> = (0..10).map(|i| id_at(130 + i)).collect();

    tracker.forget(b.udp);
    b.shutdown.cancel();

    // Entering through the donee while the hand-over is under way.
    for id in &early {
        client.insert(a.udp, *id, person("Early")).await.unwrap();
    }

    // Entering through the leaving node after it gave its range up.
    b.wait_until("range given up", |status| {
        status.phase == Phase::Leaving && status.range.is_none()
    })
    .await;
    for id in &late {
        client.insert(b.udp, *id, person("Late")).await.unwrap();
    }

    b.stop().await.unwrap();

    a.wait_for_range(0, 255).await;
    a.wait_until("every insert", |status| status.records == 20).await;
    for id in &early {
        assert!(client.await_value(a.udp, *id, &person("Early"), TIMEOUT).await.unwrap());
    }
    for id in &late {
        assert!(client.await_value(a.udp, *id, &person("Late"), TIMEOUT).await.unwrap());
    }

    a.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lowest_node_hands_range_to_successor() {
    let tracker = MockTracker::spawn().await.unwrap();
    let mut a = first_node(&tracker).await;
    let mut b = Running::start_owning(&tracker, 128, 255).await;
    a.wait_for_range(0, 127).await;
    b.wait_linked().await;
    let mut c = Running::start_owning(&tracker, 64, 127).await;
    a.wait_for_range(0, 63).await;
    a.wait_linked().await;
    c.wait_linked().await;

    let client = TestClient::bind().await.unwrap();
    let id = id_at(5);
    client.insert(c.udp, id, person("Bottom")).await.unwrap();
    a.wait_until("record at the bottom", |status| status.records == 1).await;

    tracker.forget(a.udp);
    a.stop().await.unwrap();

    c.wait_for_range(0, 127).await;
    c.wait_linked().await;
    b.wait_linked().await;
    assert!(client.await_value(b.udp, id, &person("Bottom"), TIMEOUT).await.unwrap());

    c.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_node_stops_cleanly() {
    let tracker = MockTracker::spawn().await.unwrap();
    let a = first_node(&tracker).await;
    let mut status = a.status.clone();

    a.stop().await.unwrap();
    assert_eq!(status.borrow_and_update().phase, Phase::Stopped);
}
