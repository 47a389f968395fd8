//! Error types for the node.

use rangekv_core::CoreError;
use rangekv_net::{DecodeError, TransportError};
use rangekv_store::StoreError;
use thiserror::Error;

/// Errors that stop a node.
///
/// Every error that reaches [`Node::run`](crate::Node::run) is fatal: the
/// node closes its links and the process exits with status 1. Conditions
/// the node survives (a malformed read, a peer hanging up) are logged where
/// they happen and never become a `NodeError`.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Socket failure: bind, connect, accept, poll or send.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A range operation broke the tiling of the key space.
    #[error("range error: {0}")]
    Range(#[from] CoreError),

    /// A reply in a synchronous exchange could not be decoded.
    #[error("malformed {context}: {source}")]
    Decode {
        context: &'static str,
        source: DecodeError,
    },

    /// A synchronous exchange got the wrong kind of reply.
    #[error("expected {expected}, got {got}")]
    UnexpectedReply {
        expected: &'static str,
        got: &'static str,
    },

    /// The ring is in a state the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Shutdown was requested during an unbounded wait.
    #[error("interrupted while {0}")]
    Interrupted(&'static str),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
