//! Key ranges: contiguous, inclusive sub-ranges of the 256-position key space.

use std::fmt;

use crate::error::{CoreError, Result};

/// An inclusive range `[start, end]` of key positions.
///
/// `start <= end` always holds; there is no empty range and no wrap-around.
/// The lowest node of the chain has `start == 0`, the highest `end == 255`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRange {
    start: u8,
    end: u8,
}

/// Which neighbor a range borders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The neighbor holding the range directly below.
    Predecessor,
    /// The neighbor holding the range directly above.
    Successor,
}

impl KeyRange {
    /// The whole key space, owned by a node that is alone.
    pub const FULL: Self = Self { start: 0, end: 255 };

    pub fn new(start: u8, end: u8) -> Result<Self> {
        if start > end {
            return Err(CoreError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> u8 {
        self.start
    }

    pub const fn end(&self) -> u8 {
        self.end
    }

    /// `end - start`, the quantity compared when looking for the widest node.
    pub const fn span(&self) -> u8 {
        self.end - self.start
    }

    /// Number of key positions covered (1..=256).
    pub const fn len(&self) -> u16 {
        self.span() as u16 + 1
    }

    pub const fn is_full(&self) -> bool {
        self.start == 0 && self.end == 255
    }

    pub const fn contains(&self, position: u8) -> bool {
        self.start <= position && position <= self.end
    }

    /// Split into the kept lower half and the ceded upper half.
    ///
    /// With `mid = start + (end - start) / 2` the halves are `[start, mid]`
    /// and `[mid + 1, end]`. A single-position range cannot be split.
    pub fn split(&self) -> Result<(KeyRange, KeyRange)> {
        if self.start == self.end {
            return Err(CoreError::Unsplittable(*self));
        }
        let mid = self.start + self.span() / 2;
        Ok((
            KeyRange { start: self.start, end: mid },
            KeyRange { start: mid + 1, end: self.end },
        ))
    }

    /// Merge a bordering range into this one.
    ///
    /// Returns the merged range and the side the donated range came from:
    /// a range below us was held by our predecessor, one above by our
    /// successor.
    pub fn absorb(&self, donated: KeyRange) -> Result<(KeyRange, Side)> {
        let not_adjacent = CoreError::NotAdjacent {
            owned: *self,
            donated,
        };
        if donated.start < self.start {
            if donated.end.checked_add(1) != Some(self.start) {
                return Err(not_adjacent);
            }
            Ok((KeyRange { start: donated.start, end: self.end }, Side::Predecessor))
        } else if donated.end > self.end {
            if self.end.checked_add(1) != Some(donated.start) {
                return Err(not_adjacent);
            }
            Ok((KeyRange { start: self.start, end: donated.end }, Side::Successor))
        } else {
            Err(not_adjacent)
        }
    }
}

impl fmt::Debug for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRange[{}, {}]", self.start, self.end)
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
