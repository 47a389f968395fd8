//! In-memory implementation of the RecordStore trait.
//!
//! All data is lost when the store is dropped.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rangekv_core::{RecordId, RecordValue};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, RecordStore};

/// In-memory store implementation.
///
/// Thread-safe via RwLock. An optional capacity bounds the number of
/// distinct identifiers; overwriting an existing one is always allowed.
pub struct MemoryStore {
    inner: RwLock<HashMap<RecordId, RecordValue>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty, unbounded in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Create a store that holds at most `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, id: RecordId, value: RecordValue) -> Result<InsertResult> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if let Some(slot) = inner.get_mut(&id) {
            *slot = value;
            return Ok(InsertResult::Replaced);
        }

        if let Some(capacity) = self.capacity {
            if inner.len() >= capacity {
                tracing::warn!(%id, capacity, "rejecting insert into full store");
                return Err(StoreError::Full { capacity });
            }
        }

        inner.insert(id, value);
        Ok(InsertResult::Inserted)
    }

    async fn lookup(&self, id: &RecordId) -> Result<Option<RecordValue>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.get(id).cloned())
    }

    async fn remove(&self, id: &RecordId) -> Result<Option<RecordValue>> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.remove(id))
    }

    async fn count(&self) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        inner.clear();
        Ok(())
    }
}
