//! Node configuration.

use std::net::SocketAddrV4;
use std::time::Duration;

use rangekv_net::TransportConfig;

/// Configuration for a [`Node`](crate::Node).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// UDP address of the tracker.
    pub tracker: SocketAddrV4,
    /// Longest idle wait of the serving loop; also the liveness period.
    pub poll_interval: Duration,
    /// How long to wait for each tracker reply during bootstrap.
    pub bootstrap_timeout: Duration,
    /// How long a joiner waits for the join response once linked.
    pub join_timeout: Duration,
    /// How long a leaving node waits for its range to be acknowledged.
    pub range_ack_timeout: Duration,
    /// How long a leaving node keeps forwarding after the hand-off.
    pub leave_grace: Duration,
    /// Socket settings.
    pub transport: TransportConfig,
}

impl NodeConfig {
    pub fn new(tracker: SocketAddrV4) -> Self {
        Self {
            tracker,
            poll_interval: Duration::from_secs(5),
            bootstrap_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            range_ack_timeout: Duration::from_secs(5),
            leave_grace: Duration::from_millis(300),
            transport: TransportConfig::default(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    pub fn with_leave_grace(mut self, grace: Duration) -> Self {
        self.leave_grace = grace;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}
