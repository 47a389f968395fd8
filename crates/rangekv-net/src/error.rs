//! Error types for the wire codec and the transport.

use std::net::SocketAddrV4;
use std::time::Duration;

use rangekv_core::CoreError;
use thiserror::Error;

use crate::transport::Slot;

/// A buffer that does not hold a well-formed PDU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Nothing to decode.
    #[error("empty buffer")]
    Empty,

    /// The first byte is not a known tag.
    #[error("unknown PDU tag {0}")]
    UnknownTag(u8),

    /// The buffer ends before the PDU does.
    #[error("truncated {pdu}: need {needed} bytes, have {available}")]
    Truncated {
        pdu: &'static str,
        needed: usize,
        available: usize,
    },

    /// A range field with start above end.
    #[error("invalid range [{start}, {end}]")]
    InvalidRange { start: u8, end: u8 },

    /// A value field was rejected.
    #[error("invalid value: {0}")]
    Value(#[from] CoreError),
}

/// Errors that can occur on the node's sockets.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not open one of the local sockets.
    #[error("failed to bind {what}: {source}")]
    Bind {
        what: &'static str,
        source: std::io::Error,
    },

    /// I/O failure on a slot.
    #[error("I/O error on {slot}: {source}")]
    Io { slot: Slot, source: std::io::Error },

    /// The slot has no live connection.
    #[error("{0} is not connected")]
    NotConnected(Slot),

    /// The peer did not accept our bytes in time.
    #[error("write to {0} timed out")]
    WriteTimeout(Slot),

    /// The peer went away while we were writing.
    #[error("broken pipe on {0}")]
    BrokenPipe(Slot),

    /// No data arrived within the wait.
    #[error("no data on {slot} within {waited:?}")]
    Timeout { slot: Slot, waited: Duration },

    /// The peer closed the connection during a blocking wait.
    #[error("{0} closed by peer")]
    PeerClosed(Slot),

    /// Outbound connection failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddrV4,
        source: std::io::Error,
    },

    /// Outbound connection did not complete in time.
    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddrV4),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
