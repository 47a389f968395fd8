//! RecordStore trait: the abstract interface for record storage.

use async_trait::async_trait;
use rangekv_core::{RecordId, RecordValue};

use crate::error::Result;

/// Result of inserting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// The identifier was new.
    Inserted,
    /// The identifier existed; its value was overwritten.
    Replaced,
}

/// The RecordStore trait: async interface for record storage.
///
/// # Design Notes
///
/// - **Upserts**: `insert` never fails because the identifier exists.
/// - **No ordering**: iteration order is the caller's concern; the node
///   keeps its own ordered key set for transfers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or overwrite the value stored under `id`.
    async fn insert(&self, id: RecordId, value: RecordValue) -> Result<InsertResult>;

    /// Get the value stored under `id`.
    async fn lookup(&self, id: &RecordId) -> Result<Option<RecordValue>>;

    /// Remove `id`, returning the value it held.
    async fn remove(&self, id: &RecordId) -> Result<Option<RecordValue>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Drop every record.
    async fn clear(&self) -> Result<()>;
}
