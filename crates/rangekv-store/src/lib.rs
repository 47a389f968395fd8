//! # rangekv Store
//!
//! Storage abstraction for a rangekv node. Records owned by the node live
//! behind the [`RecordStore`] trait so the node logic does not care where
//! they are kept.
//!
//! ## Key Types
//!
//! - [`RecordStore`] - The async trait for all storage operations
//! - [`MemoryStore`] - In-memory storage, optionally capacity-bounded
//! - [`InsertResult`] - Whether an insert created or replaced a record
//!
//! ## Usage
//!
//! ```rust
//! use rangekv_core::{RecordId, RecordValue};
//! use rangekv_store::{InsertResult, MemoryStore, RecordStore};
//!
//! # async fn example() -> rangekv_store::Result<()> {
//! let store = MemoryStore::new();
//! let id = RecordId::from_bytes(*b"199001011234");
//! let value = RecordValue::new("Ada", "ada@example.org").unwrap();
//!
//! assert_eq!(store.insert(id, value.clone()).await?, InsertResult::Inserted);
//! assert_eq!(store.lookup(&id).await?, Some(value));
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! - **Upserts**: Inserting an existing identifier overwrites its value and
//!   reports `Replaced`; the record count does not change.
//! - **Removes are idempotent**: Removing an absent identifier is a no-op.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::{InsertResult, RecordStore};
