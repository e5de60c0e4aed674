//! The per-node record: existence, ephemeral flag, open handles, and the
//! lock state `hyperspace-lock` operates on.
//!
//! Lock state lives on the node record rather than in its own table
//! because every lock operation already needs the node record (to check
//! `ephemeral`, to validate the path exists) and because `spec.md` §4.2
//! requires a deterministic lock order of "parent, then target, then
//! handle" — keeping one record per node is what makes that order
//! well-defined.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use hyperspace_core::{HandleId, LockMode, NodePath};
use hyperspace_storage::{StorageError, StorageResult, Transaction};
use serde::{Deserialize, Serialize};

/// A handle queued for a lock it does not yet hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiter {
    /// The handle waiting for the lock.
    pub handle: HandleId,
    /// The mode it requested.
    pub mode: LockMode,
}

/// The durable record for one node in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// True if this node is deleted when its last handle closes.
    pub ephemeral: bool,
    /// Creation time, for diagnostics.
    pub created_at: DateTime<Utc>,
    /// Handles currently open on this node.
    pub open_handles: BTreeSet<HandleId>,
    /// The mode the lock is currently held in, if any.
    pub lock_mode: Option<LockMode>,
    /// Strictly increasing generation, bumped on every grant.
    pub lock_generation: u64,
    /// Handles currently holding the lock (more than one only when shared).
    pub lock_holders: BTreeSet<HandleId>,
    /// Requests waiting for the lock, in FIFO order.
    pub waiters: VecDeque<Waiter>,
}

impl NodeRecord {
    /// A brand new, unlocked node.
    #[must_use]
    pub fn new(ephemeral: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            ephemeral,
            created_at,
            open_handles: BTreeSet::new(),
            lock_mode: None,
            lock_generation: 0,
            lock_holders: BTreeSet::new(),
            waiters: VecDeque::new(),
        }
    }

    /// True if no handle is open and no lock is held or queued on this
    /// node, i.e. it would be safe to delete if ephemeral.
    #[must_use]
    pub fn is_unreferenced(&self) -> bool {
        self.open_handles.is_empty() && self.lock_holders.is_empty() && self.waiters.is_empty()
    }
}

fn node_key(path: &NodePath) -> Vec<u8> {
    let mut key = b"n:".to_vec();
    key.extend_from_slice(path.as_str().as_bytes());
    key
}

/// Read the record for `path`, if it exists.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails or the stored
/// record is corrupt.
pub fn get_node(txn: &mut Transaction<'_>, path: &NodePath) -> StorageResult<Option<NodeRecord>> {
    let Some(bytes) = txn.get(&node_key(path))? else { return Ok(None) };
    let record = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Some(record))
}

/// Write `record` for `path`, overwriting any existing record.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn put_node(
    txn: &mut Transaction<'_>,
    path: &NodePath,
    record: &NodeRecord,
) -> StorageResult<()> {
    let bytes =
        serde_json::to_vec(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
    txn.put(&node_key(path), &bytes)
}

/// Delete the record for `path`.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn delete_node(txn: &mut Transaction<'_>, path: &NodePath) -> StorageResult<()> {
    txn.delete(&node_key(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_storage::Store;

    #[test]
    fn roundtrips_through_the_store() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let path = NodePath::parse("/test").unwrap();
        let mut txn = store.begin().unwrap();
        assert!(get_node(&mut txn, &path).unwrap().is_none());

        let record = NodeRecord::new(false, Utc::now());
        put_node(&mut txn, &path, &record).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        let fetched = get_node(&mut txn, &path).unwrap().unwrap();
        assert!(!fetched.ephemeral);
        assert!(fetched.is_unreferenced());
    }
}
