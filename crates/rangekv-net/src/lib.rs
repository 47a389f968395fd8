//! # rangekv Net
//!
//! Wire protocol and socket plumbing for a rangekv node.
//!
//! ## Overview
//!
//! Nodes form a ring over TCP links (each node has one successor and one
//! predecessor) and talk to an external tracker over UDP. Clients send
//! value requests to any node over UDP; requests for keys the node does
//! not own travel along successor links until they reach the owner.
//!
//! ## Key Types
//!
//! - [`Pdu`] - Every message of the protocol, with its exact byte layout
//! - [`Frames`] - Walks several PDUs packed into one datagram
//! - [`FrameBuffer`] - Reassembles PDUs that straddle TCP reads
//! - [`Multiplexer`] - The node's UDP socket, TCP listener and two links
//! - [`Slot`] - Names one of those four sockets
//!
//! ## Message Flow
//!
//! ```text
//! Joiner                 Tracker                 Ring member
//!   |--- STUN_LOOKUP ------>|                         |
//!   |<-- STUN_RESPONSE -----|                         |
//!   |--- NET_GET_NODE ----->|                         |
//!   |<-- NET_GET_NODE_RESPONSE                        |
//!   |--- NET_JOIN (UDP) ----------------------------->|
//!   |                       |      (forwarded around the ring to the
//!   |                       |       widest node, which splits)
//!   |<== TCP connect + NET_JOIN_RESPONSE ============|
//!   |<== VAL_INSERT ... (records in the ceded range) |
//! ```

pub mod error;
pub mod pdu;
pub mod transport;

pub use error::{DecodeError, Result, TransportError};
pub use pdu::{sizes, tag_name, tags, FrameBuffer, Frames, JoinRequest, Pdu};
pub use transport::{Inbound, Multiplexer, ReadySet, Slot, TransportConfig};
