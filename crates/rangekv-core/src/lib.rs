//! # rangekv Core
//!
//! Pure primitives for a rangekv node: record identifiers, record values,
//! key ranges, node addresses and the key-hash function.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`RecordId`] - Fixed 12-byte record identifier
//! - [`RecordValue`] - The (name, email) payload stored under an identifier
//! - [`KeyRange`] - Inclusive sub-range of the 256-position key space
//! - [`NodeAddr`] - IPv4 address and port of a node, as carried on the wire
//! - [`KeyHasher`] - Maps a [`RecordId`] to its position in the key space
//!
//! ## Key Space
//!
//! The key space has exactly 256 positions (`0..=255`). Every node owns one
//! contiguous [`KeyRange`]; together the live nodes tile the whole space.

pub mod error;
pub mod hash;
pub mod range;
pub mod record;
pub mod types;

pub use error::{CoreError, Result};
pub use hash::{Blake3KeyHasher, KeyHasher};
pub use range::{KeyRange, Side};
pub use record::{Record, RecordValue, MAX_FIELD_LEN};
pub use types::{NodeAddr, RecordId, RECORD_ID_LEN};
