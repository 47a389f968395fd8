//! # rangekv
//!
//! A distributed key-value store whose nodes share an 8-bit key space
//! arranged as a ring.
//!
//! ## Overview
//!
//! Each node owns one contiguous range of key-space positions and stores
//! the records hashing into it. Nodes are linked in a ring by TCP: every
//! node has a predecessor (the link it accepted) and a successor (the link
//! it opened). A request for a key the node does not own is passed to the
//! successor until it reaches the owner.
//!
//! - **Bootstrap**: learn the public address from the tracker, then ask it
//!   for a live member.
//! - **Seed**: with no member, own the whole key space.
//! - **Join**: otherwise ask the ring for a range; the node owning the widest
//!   range splits it and hands over the upper half with its records.
//! - **Serve**: apply or forward `VAL_INSERT`, `VAL_REMOVE` and `VAL_LOOKUP`
//!   while reporting liveness to the tracker.
//! - **Leave**: on shutdown, give the range and records to a neighbor and
//!   splice the ring back together.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! use rangekv::{Node, NodeConfig};
//! use rangekv::core::Blake3KeyHasher;
//! use rangekv::store::MemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() -> rangekv::Result<()> {
//!     let tracker = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 4000);
//!     let shutdown = CancellationToken::new();
//!
//!     let node = Node::bind(
//!         NodeConfig::new(tracker),
//!         MemoryStore::new(),
//!         Blake3KeyHasher,
//!         shutdown.clone(),
//!     )
//!     .await?;
//!
//!     // Cancelling the token makes the node leave the ring.
//!     node.run().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `rangekv::core` - Key space, record and address types
//! - `rangekv::store` - Storage abstraction and the in-memory store
//! - `rangekv::net` - PDU codec and socket multiplexer

pub mod config;
pub mod error;
pub mod node;
pub mod range_table;
pub mod router;
pub mod status;

// Re-export component crates
pub use rangekv_core as core;
pub use rangekv_net as net;
pub use rangekv_store as store;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::Node;
pub use range_table::RangeTable;
pub use router::{RecordRouter, Routed, ValueOp};
pub use status::{NodeStatus, Phase};
