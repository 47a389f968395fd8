//! Error types for rangekv core.

use thiserror::Error;

use crate::range::KeyRange;

/// Errors raised while constructing or combining core values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Range bounds are inverted.
    #[error("invalid range: start {start} > end {end}")]
    InvalidRange { start: u8, end: u8 },

    /// A value field does not fit its one-byte length prefix.
    #[error("{field} is {len} bytes, at most 255 allowed")]
    FieldTooLong { field: &'static str, len: usize },

    /// A donated range does not border the owned range.
    #[error("range {donated} is not adjacent to {owned}")]
    NotAdjacent { owned: KeyRange, donated: KeyRange },

    /// A single-position range has no upper half to cede.
    #[error("range {0} cannot be split")]
    Unsplittable(KeyRange),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
