//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store already holds as many records as it may.
    #[error("store is full ({capacity} records)")]
    Full { capacity: usize },

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
