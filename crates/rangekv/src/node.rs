//! The node: bootstrap, join or seed, serve, leave.
//!
//! A node runs on a single task. Between its synchronous rendezvous points
//! (tracker replies, the join response, the range acknowledgement when
//! leaving) it sits in one poll loop over its UDP socket and its two ring
//! links, dispatching value requests to the [`RecordRouter`] and membership
//! PDUs to the handlers below.
//!
//! The ring closes on itself: the highest node's successor is the lowest
//! node. Join requests rely on this, they travel successor links until they
//! come back to the widest node. Range arithmetic never wraps.

use std::net::SocketAddrV4;
use std::time::Duration;

use rangekv_core::{KeyHasher, KeyRange, NodeAddr, Side};
use rangekv_net::{
    sizes, DecodeError, Inbound, JoinRequest, Multiplexer, Pdu, ReadySet, Slot, TransportError,
};
use rangekv_store::RecordStore;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::range_table::RangeTable;
use crate::router::{RecordRouter, Routed, ValueOp};
use crate::status::{NodeStatus, Phase};

/// Which ring links are up.
enum Neighbors {
    None,
    Both,
    /// Exactly one link: never valid.
    Partial,
}

/// A rangekv node.
pub struct Node<S, H> {
    config: NodeConfig,
    mux: Multiplexer,
    table: RangeTable,
    router: RecordRouter<S, H>,
    /// Public address and listening port, known after bootstrap.
    me: NodeAddr,
    udp_port: u16,
    phase: Phase,
    /// Neighbor whose range acknowledgement we are waiting for.
    pending_ack: Option<Side>,
    shutdown: CancellationToken,
    status: watch::Sender<NodeStatus>,
}

impl<S: RecordStore, H: KeyHasher> Node<S, H> {
    /// Open the node's sockets.
    ///
    /// Nothing is sent until [`run`](Self::run). Cancelling `shutdown`
    /// makes a serving node leave the ring gracefully.
    pub async fn bind(
        config: NodeConfig,
        store: S,
        hasher: H,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let mux = Multiplexer::bind(config.transport.clone()).await?;
        let udp_port = mux.udp_port()?;
        let (status, _) = watch::channel(NodeStatus {
            phase: Phase::Bootstrapping,
            address: NodeAddr::UNSPECIFIED,
            udp_port,
            range: None,
            records: 0,
            has_predecessor: false,
            has_successor: false,
        });

        Ok(Self {
            config,
            mux,
            table: RangeTable::new(),
            router: RecordRouter::new(store, hasher),
            me: NodeAddr::UNSPECIFIED,
            udp_port,
            phase: Phase::Bootstrapping,
            pending_ack: None,
            shutdown,
            status,
        })
    }

    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    /// Subscribe to status snapshots.
    pub fn status(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Run the node until it has left the ring or failed.
    ///
    /// All links are closed on return, whatever the outcome.
    pub async fn run(mut self) -> Result<()> {
        let span = tracing::info_span!("node", udp = self.udp_port);
        let result = self.drive().instrument(span).await;
        self.mux.close_all();
        self.enter(Phase::Stopped);
        result
    }

    async fn drive(&mut self) -> Result<()> {
        self.bootstrap().await?;
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        match self.rendezvous().await? {
            None => self.seed(),
            Some(member) => self.join(member).await?,
        }
        self.serve().await?;
        self.leave().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bootstrap
    // ─────────────────────────────────────────────────────────────────────────

    async fn bootstrap(&mut self) -> Result<()> {
        self.enter(Phase::Bootstrapping);
        self.send_tracker(&Pdu::StunLookup).await?;

        let timeout = self.config.bootstrap_timeout;
        match self
            .await_reply(Slot::Tracker, sizes::STUN_RESPONSE, timeout, "STUN_RESPONSE")
            .await?
        {
            Pdu::StunResponse { addr } => {
                self.me = NodeAddr::new(addr, self.mux.listen_port()?);
                info!(address = %self.me, "public address discovered");
                Ok(())
            }
            other => Err(NodeError::UnexpectedReply {
                expected: "STUN_RESPONSE",
                got: other.name(),
            }),
        }
    }

    /// Ask the tracker for a live member; `None` if the network is empty.
    ///
    /// A tracker that still remembers this node from an earlier run may
    /// offer it back to itself. There is nobody to join then, so that is
    /// treated like an empty network.
    async fn rendezvous(&mut self) -> Result<Option<NodeAddr>> {
        self.enter(Phase::Rendezvous);
        self.send_tracker(&Pdu::NetGetNode).await?;

        let timeout = self.config.bootstrap_timeout;
        let reply = self
            .await_reply(
                Slot::Tracker,
                sizes::NET_GET_NODE_RESPONSE,
                timeout,
                "NET_GET_NODE_RESPONSE",
            )
            .await?;
        match reply {
            Pdu::NetGetNodeResponse { member } if member.is_unspecified() => Ok(None),
            Pdu::NetGetNodeResponse { member } if member == self.tracker_identity() => {
                warn!(%member, "tracker offered this node as its own entry point");
                Ok(None)
            }
            Pdu::NetGetNodeResponse { member } => Ok(Some(member)),
            other => Err(NodeError::UnexpectedReply {
                expected: "NET_GET_NODE_RESPONSE",
                got: other.name(),
            }),
        }
    }

    fn seed(&mut self) {
        self.enter(Phase::Seeding);
        self.table.seed();
        info!(range = %KeyRange::FULL, "first node, owning the whole key space");
    }

    async fn join(&mut self, member: NodeAddr) -> Result<()> {
        self.enter(Phase::Joining);
        info!(%member, "joining through member");

        let request = Pdu::NetJoin(JoinRequest::new(self.me));
        self.mux
            .send_udp(member.to_socket_addr(), &request.encode())
            .await?;

        self.await_predecessor("waiting for the splitting node").await?;

        let timeout = self.config.join_timeout;
        let reply = self
            .await_reply(
                Slot::Predecessor,
                sizes::NET_JOIN_RESPONSE,
                timeout,
                "NET_JOIN_RESPONSE",
            )
            .await?;
        let (next, range) = match reply {
            Pdu::NetJoinResponse { next, range } => (next, range),
            other => {
                return Err(NodeError::UnexpectedReply {
                    expected: "NET_JOIN_RESPONSE",
                    got: other.name(),
                })
            }
        };

        self.table.assign(range);
        self.mux.connect_successor(next.to_socket_addr()).await?;
        self.table.set_successor(Some(next));
        info!(%range, successor = %next, "joined the ring");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serving
    // ─────────────────────────────────────────────────────────────────────────

    async fn serve(&mut self) -> Result<()> {
        self.enter(Phase::Serving);
        while !self.shutdown.is_cancelled() {
            self.send_tracker(&Pdu::NetAlive).await?;
            let ready = self
                .mux
                .poll_readable(self.config.poll_interval, Some(&self.shutdown))
                .await?;
            self.service(ready).await?;
            self.publish();
        }
        info!("shutdown requested");
        Ok(())
    }

    /// Drain one read from every ready slot.
    async fn service(&mut self, ready: ReadySet) -> Result<()> {
        for slot in ready.iter() {
            match self.mux.recv(slot) {
                Ok(Inbound::Pdus { pdus, error }) => {
                    for pdu in pdus {
                        self.dispatch(slot, pdu).await?;
                    }
                    if let Some(err) = error {
                        self.malformed(slot, err).await?;
                    }
                }
                Ok(Inbound::Closed) => self.peer_closed(slot).await?,
                Ok(Inbound::Idle) => {}
                // An earlier handler in this batch dropped the link.
                Err(TransportError::NotConnected(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// A PDU that cannot be decoded. A datagram only loses its tail, but a
    /// link that can no longer be framed is dropped.
    async fn malformed(&mut self, slot: Slot, err: DecodeError) -> Result<()> {
        match slot {
            Slot::Successor | Slot::Predecessor => {
                warn!(%slot, error = %err, "malformed PDU, closing link");
                self.mux.close(slot);
                self.peer_closed(slot).await
            }
            Slot::Tracker | Slot::Listening => {
                warn!(%slot, error = %err, "malformed PDU, dropping rest of datagram");
                Ok(())
            }
        }
    }

    async fn dispatch(&mut self, slot: Slot, pdu: Pdu) -> Result<()> {
        debug!(%slot, pdu = pdu.name(), "received");
        let pdu = match ValueOp::from_pdu(pdu) {
            Ok(op) => return self.route_value(op).await,
            Err(pdu) => pdu,
        };
        match pdu {
            Pdu::NetJoin(request) => self.handle_join(request).await,
            Pdu::NetNewRange { range } => self.handle_new_range(range).await,
            Pdu::NetNewRangeResponse => {
                self.handle_range_ack(slot);
                Ok(())
            }
            Pdu::NetLeaving { next } => self.handle_leaving(next).await,
            Pdu::NetCloseConnection => self.handle_close(slot).await,
            other => {
                warn!(%slot, pdu = other.name(), "unexpected PDU ignored");
                Ok(())
            }
        }
    }

    async fn route_value(&mut self, op: ValueOp) -> Result<()> {
        match self.router.route(op, self.table.owned()).await? {
            Routed::Forward(pdu) => self.mux.send_tcp(Slot::Successor, &pdu.encode()).await?,
            Routed::Reply { to, pdu } => self.mux.send_udp(to, &pdu.encode()).await?,
            Routed::Inserted(_) | Routed::Removed(_) | Routed::Dropped => {}
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_join(&mut self, request: JoinRequest) -> Result<()> {
        if self.phase != Phase::Serving {
            warn!(joiner = %request.src, phase = %self.phase, "ignoring join request");
            return Ok(());
        }
        let range = self.table.require_owned()?;

        match self.neighbors() {
            Neighbors::None => return self.admit_alone(request.src).await,
            Neighbors::Partial => return Err(self.half_linked()),
            Neighbors::Both => {}
        }

        if request.max == self.me {
            self.admit(request.src).await
        } else if request.max_span < range.span() {
            debug!(joiner = %request.src, span = range.span(), "widest so far, forwarding");
            self.forward_join(request.claim(range.span(), self.me)).await
        } else {
            self.forward_join(request).await
        }
    }

    async fn forward_join(&mut self, request: JoinRequest) -> Result<()> {
        self.mux
            .send_tcp(Slot::Successor, &Pdu::NetJoin(request).encode())
            .await?;
        Ok(())
    }

    /// Split for a joiner while alone: it becomes both our successor and
    /// our predecessor.
    async fn admit_alone(&mut self, joiner: NodeAddr) -> Result<()> {
        info!(%joiner, "alone, splitting for joiner");
        self.mux.connect_successor(joiner.to_socket_addr()).await?;
        self.table.set_successor(Some(joiner));
        self.cede_upper_half(self.me).await?;
        self.await_predecessor("waiting for the joiner to link back")
            .await
    }

    /// Split for a joiner as the widest node: the joiner slots in between
    /// us and our current successor.
    async fn admit(&mut self, joiner: NodeAddr) -> Result<()> {
        let range = self.table.require_owned()?;
        if range.span() == 0 {
            warn!(%joiner, %range, "range too narrow to split, join dropped");
            return Ok(());
        }
        let previous = self.table.successor().ok_or_else(|| {
            NodeError::ProtocolViolation("successor link without an address".into())
        })?;
        info!(%joiner, %previous, "widest node, splitting for joiner");

        self.mux
            .send_tcp(Slot::Successor, &Pdu::NetCloseConnection.encode())
            .await?;
        self.mux.connect_successor(joiner.to_socket_addr()).await?;
        self.table.set_successor(Some(joiner));
        self.cede_upper_half(previous).await
    }

    /// Send the joiner its range and the records in it.
    async fn cede_upper_half(&mut self, next: NodeAddr) -> Result<()> {
        let ceded = self.table.split()?;
        let response = Pdu::NetJoinResponse { next, range: ceded };
        self.mux
            .send_tcp(Slot::Successor, &response.encode())
            .await?;
        let moved = self.hand_off(Slot::Successor).await?;
        info!(
            kept = %self.table.require_owned()?,
            %ceded,
            records = moved,
            "range split"
        );
        self.publish();
        Ok(())
    }

    /// A departing neighbor hands us its range.
    async fn handle_new_range(&mut self, donated: KeyRange) -> Result<()> {
        let side = self.table.absorb(donated)?;
        info!(
            %donated,
            range = %self.table.require_owned()?,
            from = ?side,
            "absorbed departing neighbor's range"
        );
        self.mux
            .send_tcp(side_slot(side), &Pdu::NetNewRangeResponse.encode())
            .await?;
        self.publish();
        Ok(())
    }

    fn handle_range_ack(&mut self, slot: Slot) {
        match self.pending_ack {
            Some(side) if side_slot(side) == slot => {
                self.pending_ack = None;
                debug!(%slot, "range hand-over acknowledged");
            }
            _ => warn!(%slot, "unsolicited NET_NEW_RANGE_RESPONSE"),
        }
    }

    /// Our successor left; link to the node after it.
    async fn handle_leaving(&mut self, next: NodeAddr) -> Result<()> {
        self.mux.close(Slot::Successor);
        if next == self.me {
            self.table.set_successor(None);
            info!("successor left, now the only node");
        } else {
            self.mux.connect_successor(next.to_socket_addr()).await?;
            self.table.set_successor(Some(next));
            info!(successor = %next, "successor left, relinked");
        }
        self.publish();
        Ok(())
    }

    /// Our predecessor is going away, either leaving or being replaced by
    /// a joiner.
    async fn handle_close(&mut self, slot: Slot) -> Result<()> {
        if slot != Slot::Predecessor {
            warn!(%slot, "NET_CLOSE_CONNECTION on unexpected link");
        }
        self.mux.close(Slot::Predecessor);
        self.replace_predecessor().await
    }

    async fn peer_closed(&mut self, slot: Slot) -> Result<()> {
        warn!(%slot, "link lost");
        match slot {
            Slot::Predecessor => self.replace_predecessor().await,
            Slot::Successor => {
                self.table.set_successor(None);
                Ok(())
            }
            Slot::Tracker | Slot::Listening => Ok(()),
        }
    }

    async fn replace_predecessor(&mut self) -> Result<()> {
        if self.phase != Phase::Serving {
            return Ok(());
        }
        if self.table.is_full() {
            info!("predecessor gone, last node in the ring");
            return Ok(());
        }
        info!("predecessor gone, waiting for a new one");
        self.await_predecessor("waiting for a new predecessor")
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Leaving
    // ─────────────────────────────────────────────────────────────────────────

    async fn leave(&mut self) -> Result<()> {
        self.enter(Phase::Leaving);
        match self.neighbors() {
            Neighbors::None => {
                info!("no neighbors, leaving");
                return self.router.clear().await;
            }
            Neighbors::Partial => return Err(self.half_linked()),
            Neighbors::Both => {}
        }

        let range = self.table.require_owned()?;
        let donee = self.table.donee()?;
        let slot = side_slot(donee);
        info!(%range, to = %slot, "handing over range");

        self.mux
            .send_tcp(slot, &Pdu::NetNewRange { range }.encode())
            .await?;
        self.await_range_ack(donee).await?;

        self.table.relinquish();
        let moved = self.hand_off(slot).await?;
        info!(records = moved, "records handed over");
        self.publish();

        self.drain_for(self.config.leave_grace).await?;

        let next = self.table.successor().ok_or_else(|| {
            NodeError::ProtocolViolation("successor link without an address".into())
        })?;
        self.mux
            .send_tcp(Slot::Successor, &Pdu::NetCloseConnection.encode())
            .await?;
        self.mux
            .send_tcp(Slot::Predecessor, &Pdu::NetLeaving { next }.encode())
            .await?;
        self.mux.close_all();
        self.router.clear().await?;
        info!("left the ring");
        Ok(())
    }

    /// Keep serving until the donee acknowledges our range.
    async fn await_range_ack(&mut self, side: Side) -> Result<()> {
        let waited = self.config.range_ack_timeout;
        let deadline = Instant::now() + waited;
        self.pending_ack = Some(side);
        while self.pending_ack.is_some() {
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout {
                    slot: side_slot(side),
                    waited,
                }
                .into());
            }
            let ready = self.mux.poll_readable(deadline - now, None).await?;
            self.service(ready).await?;
        }
        Ok(())
    }

    /// Keep serving for `window`.
    async fn drain_for(&mut self, window: Duration) -> Result<()> {
        let deadline = Instant::now() + window;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let ready = self.mux.poll_readable(deadline - now, None).await?;
            self.service(ready).await?;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Send every record we no longer own to a neighbor, dropping each once
    /// it is written.
    async fn hand_off(&mut self, slot: Slot) -> Result<usize> {
        let records = self.router.records_outside(self.table.owned()).await?;
        let count = records.len();
        for record in records {
            let id = record.id;
            let pdu = Pdu::ValInsert {
                id,
                value: record.value,
            };
            self.mux.send_tcp(slot, &pdu.encode()).await?;
            self.router.evict(&id).await?;
        }
        Ok(count)
    }

    async fn await_predecessor(&mut self, context: &'static str) -> Result<()> {
        match self.mux.accept_predecessor(&self.shutdown).await? {
            Some(peer) => {
                info!(%peer, "predecessor linked");
                self.publish();
                Ok(())
            }
            None => Err(NodeError::Interrupted(context)),
        }
    }

    async fn await_reply(
        &mut self,
        slot: Slot,
        len: usize,
        timeout: Duration,
        expected: &'static str,
    ) -> Result<Pdu> {
        let bytes = self.mux.recv_blocking(slot, len, timeout).await?;
        let (pdu, _) = Pdu::decode(&bytes).map_err(|source| NodeError::Decode {
            context: expected,
            source,
        })?;
        Ok(pdu)
    }

    async fn send_tracker(&self, pdu: &Pdu) -> Result<()> {
        let tracker: SocketAddrV4 = self.config.tracker;
        self.mux.send_udp(tracker, &pdu.encode()).await?;
        Ok(())
    }

    /// The address the tracker knows this node by: public IP, UDP port.
    fn tracker_identity(&self) -> NodeAddr {
        NodeAddr::new(self.me.ip, self.udp_port)
    }

    fn neighbors(&self) -> Neighbors {
        match (
            self.mux.is_connected(Slot::Predecessor),
            self.mux.is_connected(Slot::Successor),
        ) {
            (false, false) => Neighbors::None,
            (true, true) => Neighbors::Both,
            _ => Neighbors::Partial,
        }
    }

    fn half_linked(&self) -> NodeError {
        NodeError::ProtocolViolation(format!(
            "exactly one ring link is up (predecessor: {}, successor: {})",
            self.mux.is_connected(Slot::Predecessor),
            self.mux.is_connected(Slot::Successor),
        ))
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        info!(%phase, "phase");
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(NodeStatus {
            phase: self.phase,
            address: self.me,
            udp_port: self.udp_port,
            range: self.table.owned(),
            records: self.router.len(),
            has_predecessor: self.mux.is_connected(Slot::Predecessor),
            has_successor: self.mux.is_connected(Slot::Successor),
        });
    }
}

fn side_slot(side: Side) -> Slot {
    match side {
        Side::Predecessor => Slot::Predecessor,
        Side::Successor => Slot::Successor,
    }
}
