//! Observable node state.

use std::fmt;

use rangekv_core::{KeyRange, NodeAddr};

/// Lifecycle phase of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Asking the tracker for our public address.
    Bootstrapping,
    /// Asking the tracker for a live member.
    Rendezvous,
    /// First node: claiming the whole key space.
    Seeding,
    /// Negotiating a range with the ring.
    Joining,
    /// Serving requests.
    Serving,
    /// Handing the range and records to a neighbor.
    Leaving,
    /// Sockets closed.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Bootstrapping => "bootstrapping",
            Phase::Rendezvous => "rendezvous",
            Phase::Seeding => "seeding",
            Phase::Joining => "joining",
            Phase::Serving => "serving",
            Phase::Leaving => "leaving",
            Phase::Stopped => "stopped",
        })
    }
}

/// Snapshot published by a running node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub phase: Phase,
    /// Public address and listening port; unspecified before bootstrap.
    pub address: NodeAddr,
    /// Local port of the UDP socket clients send requests to.
    pub udp_port: u16,
    /// Owned range, if any.
    pub range: Option<KeyRange>,
    /// Number of records held locally.
    pub records: usize,
    pub has_predecessor: bool,
    pub has_successor: bool,
}

impl NodeStatus {
    pub fn is_serving(&self) -> bool {
        self.phase == Phase::Serving
    }
}
