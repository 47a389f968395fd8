//! Record routing: apply value requests for owned keys, forward the rest.

use std::collections::BTreeSet;
use std::net::SocketAddrV4;

use rangekv_core::{KeyHasher, KeyRange, NodeAddr, Record, RecordId, RecordValue};
use rangekv_net::Pdu;
use rangekv_store::{InsertResult, RecordStore, StoreError};
use tracing::{debug, warn};

use crate::error::Result;

/// A value request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueOp {
    Insert { id: RecordId, value: RecordValue },
    Remove { id: RecordId },
    Lookup { id: RecordId, reply_to: NodeAddr },
}

impl ValueOp {
    /// Extract a value request, handing back any other PDU untouched.
    ///
    /// `VAL_LOOKUP_RESPONSE` is addressed to clients, not nodes, so it is
    /// not a request.
    pub fn from_pdu(pdu: Pdu) -> std::result::Result<Self, Pdu> {
        match pdu {
            Pdu::ValInsert { id, value } => Ok(ValueOp::Insert { id, value }),
            Pdu::ValRemove { id } => Ok(ValueOp::Remove { id }),
            Pdu::ValLookup { id, reply_to } => Ok(ValueOp::Lookup { id, reply_to }),
            other => Err(other),
        }
    }

    pub fn id(&self) -> &RecordId {
        match self {
            ValueOp::Insert { id, .. } | ValueOp::Remove { id } | ValueOp::Lookup { id, .. } => id,
        }
    }

    pub fn into_pdu(self) -> Pdu {
        match self {
            ValueOp::Insert { id, value } => Pdu::ValInsert { id, value },
            ValueOp::Remove { id } => Pdu::ValRemove { id },
            ValueOp::Lookup { id, reply_to } => Pdu::ValLookup { id, reply_to },
        }
    }
}

/// What the node must do after routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Stored locally.
    Inserted(InsertResult),
    /// Removed locally; `false` if the id was absent.
    Removed(bool),
    /// Not stored: the store is full.
    Dropped,
    /// Send `pdu` over UDP to `to`.
    Reply { to: SocketAddrV4, pdu: Pdu },
    /// Not ours: send `pdu` to the successor.
    Forward(Pdu),
}

/// Applies or forwards value requests and tracks the owned keys.
///
/// The ordered key set mirrors the store so transfers walk records in a
/// stable order without the store having to support iteration.
pub struct RecordRouter<S, H> {
    store: S,
    hasher: H,
    keys: BTreeSet<RecordId>,
}

impl<S: RecordStore, H: KeyHasher> RecordRouter<S, H> {
    pub fn new(store: S, hasher: H) -> Self {
        Self {
            store,
            hasher,
            keys: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Key-space position of `id`.
    pub fn position(&self, id: &RecordId) -> u8 {
        self.hasher.position(id)
    }

    /// Number of records held locally.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.keys.contains(id)
    }

    /// Route one request against the owned range.
    pub async fn route(&mut self, op: ValueOp, owned: Option<KeyRange>) -> Result<Routed> {
        let position = self.position(op.id());
        if !owned.is_some_and(|range| range.contains(position)) {
            debug!(id = %op.id(), position, "forwarding to successor");
            return Ok(Routed::Forward(op.into_pdu()));
        }

        match op {
            ValueOp::Insert { id, value } => match self.store.insert(id, value).await {
                Ok(result) => {
                    self.keys.insert(id);
                    debug!(%id, position, ?result, "stored");
                    Ok(Routed::Inserted(result))
                }
                Err(StoreError::Full { capacity }) => {
                    warn!(%id, capacity, "store full, insert dropped");
                    Ok(Routed::Dropped)
                }
                Err(err) => Err(err.into()),
            },
            ValueOp::Remove { id } => {
                let removed = self.store.remove(&id).await?.is_some();
                self.keys.remove(&id);
                debug!(%id, position, removed, "removed");
                Ok(Routed::Removed(removed))
            }
            ValueOp::Lookup { id, reply_to } => {
                let value = self.store.lookup(&id).await?.unwrap_or_default();
                debug!(%id, position, to = %reply_to, found = !value.is_empty(), "lookup");
                Ok(Routed::Reply {
                    to: reply_to.to_socket_addr(),
                    pdu: Pdu::ValLookupResponse { id, value },
                })
            }
        }
    }

    /// Records whose key lies outside `owned`, in key order.
    ///
    /// With no owned range every record qualifies.
    pub async fn records_outside(&self, owned: Option<KeyRange>) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for id in &self.keys {
            let position = self.hasher.position(id);
            if owned.is_some_and(|range| range.contains(position)) {
                continue;
            }
            if let Some(value) = self.store.lookup(id).await? {
                records.push(Record::new(*id, value));
            }
        }
        Ok(records)
    }

    /// Drop a record after it has been handed to a neighbor.
    pub async fn evict(&mut self, id: &RecordId) -> Result<()> {
        self.store.remove(id).await?;
        self.keys.remove(id);
        Ok(())
    }

    /// Drop every record.
    pub async fn clear(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.keys.clear();
        Ok(())
    }
}
