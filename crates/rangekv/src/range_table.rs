//! The node's view of its place in the ring: the range it owns and the
//! node it forwards to.

use rangekv_core::{KeyRange, NodeAddr, Side};

use crate::error::{NodeError, Result};

/// Owned range plus the successor's address.
///
/// The table only changes through the operations the protocol allows:
/// claim everything, adopt a ceded range, split off the upper half, absorb
/// a bordering range, give everything up.
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    owned: Option<KeyRange>,
    /// Listening identity of the successor, as named in the protocol.
    successor: Option<NodeAddr>,
}

impl RangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned(&self) -> Option<KeyRange> {
        self.owned
    }

    /// The owned range, or a protocol violation if there is none.
    pub fn require_owned(&self) -> Result<KeyRange> {
        self.owned
            .ok_or_else(|| NodeError::ProtocolViolation("node owns no range".into()))
    }

    pub fn owns(&self, position: u8) -> bool {
        self.owned.is_some_and(|range| range.contains(position))
    }

    pub fn is_full(&self) -> bool {
        self.owned.is_some_and(|range| range.is_full())
    }

    /// Claim the whole key space.
    pub fn seed(&mut self) {
        self.owned = Some(KeyRange::FULL);
    }

    /// Adopt the range ceded by the node we split.
    pub fn assign(&mut self, range: KeyRange) {
        self.owned = Some(range);
    }

    /// Keep the lower half of the owned range and return the upper half.
    pub fn split(&mut self) -> Result<KeyRange> {
        let (kept, ceded) = self.require_owned()?.split()?;
        self.owned = Some(kept);
        Ok(ceded)
    }

    /// Merge a departing neighbor's range, returning which neighbor it was.
    pub fn absorb(&mut self, donated: KeyRange) -> Result<Side> {
        let (merged, side) = self.require_owned()?.absorb(donated)?;
        self.owned = Some(merged);
        Ok(side)
    }

    /// Give up the owned range; everything is forwarded from now on.
    pub fn relinquish(&mut self) -> Option<KeyRange> {
        self.owned.take()
    }

    /// Neighbor that receives our range when we leave.
    ///
    /// The lowest node has no predecessor range to merge into, so it hands
    /// over upward; everyone else hands over downward.
    pub fn donee(&self) -> Result<Side> {
        let range = self.require_owned()?;
        Ok(if range.start() == 0 {
            Side::Successor
        } else {
            Side::Predecessor
        })
    }

    pub fn successor(&self) -> Option<NodeAddr> {
        self.successor
    }

    pub fn set_successor(&mut self, successor: Option<NodeAddr>) {
        self.successor = successor;
    }
}
