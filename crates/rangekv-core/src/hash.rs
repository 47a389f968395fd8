//! Key hashing: the map from a record identifier to a key position.
//!
//! Every node of a deployment must use the same hasher, otherwise requests
//! bounce between nodes that each believe another one owns the key.

use crate::types::RecordId;

/// Deterministic map from a [`RecordId`] to a position in `0..=255`.
pub trait KeyHasher: Send + Sync {
    fn position(&self, id: &RecordId) -> u8;
}

/// Default hasher: first byte of the Blake3 digest of the identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3KeyHasher;

impl KeyHasher for Blake3KeyHasher {
    fn position(&self, id: &RecordId) -> u8 {
        blake3::hash(id.as_bytes()).as_bytes()[0]
    }
}
