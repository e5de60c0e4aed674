//! Node-tree operations: `mkdir`, `unlink`, `open`, `exists`, `readdir`,
//! and the ephemeral-node cleanup step of handle destruction.
//!
//! Locking (`lock`/`release`/pending-grant) is deliberately absent here:
//! it lives in `hyperspace-lock`, which depends on this crate's
//! [`NodeRecord`] and [`HandleRecord`]. A caller that wants "open with an
//! atomic lock" runs [`open`] and `hyperspace_lock::lock_in_txn` inside
//! the same transaction before committing (`spec.md` §4.2).

use chrono::Utc;
use hyperspace_core::{HandleId, HyperspaceError, HyperspaceResult, NodePath, OpenFlags};
use hyperspace_storage::{bump_counter_in_txn, Transaction};

use crate::handle::{self, HandleRecord};
use crate::node::{self, NodeRecord};

const HANDLE_COUNTER_KEY: &[u8] = b"ctr:handle";

fn child_key(parent: &NodePath, child: &str) -> Vec<u8> {
    let mut key = b"c:".to_vec();
    key.extend_from_slice(parent.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(child.as_bytes());
    key
}

fn child_prefix(parent: &NodePath) -> Vec<u8> {
    let mut key = b"c:".to_vec();
    key.extend_from_slice(parent.as_str().as_bytes());
    key.push(0);
    key
}

fn require_node(
    txn: &mut Transaction<'_>,
    path: &NodePath,
) -> HyperspaceResult<NodeRecord> {
    node::get_node(txn, path)?.ok_or_else(|| HyperspaceError::FileNotFound(path.to_string()))
}

/// Create an interior node. Fails if the parent is missing, the node
/// already exists, or the root is targeted.
///
/// # Errors
///
/// Returns [`HyperspaceError::BadPathname`] for the root or for a missing
/// intermediate parent (`spec.md` §8 S1), or [`HyperspaceError::FileExists`]
/// if `path` already exists.
pub fn mkdir(txn: &mut Transaction<'_>, path: &NodePath) -> HyperspaceResult<()> {
    let Some((parent, name)) = path.split_parent() else {
        return Err(HyperspaceError::BadPathname("cannot mkdir the root".to_owned()));
    };
    if node::get_node(txn, &parent)?.is_none() {
        return Err(HyperspaceError::BadPathname(format!("missing intermediate parent {parent}")));
    }
    if node::get_node(txn, path)?.is_some() {
        return Err(HyperspaceError::FileExists(path.to_string()));
    }
    node::put_node(txn, path, &NodeRecord::new(false, Utc::now()))?;
    txn.put(&child_key(&parent, name), &[])?;
    Ok(())
}

/// Remove a node that has no open handles and no lock state.
///
/// # Errors
///
/// Returns [`HyperspaceError::BadPathname`] for the root,
/// [`HyperspaceError::FileNotFound`] if `path` does not exist, or
/// [`HyperspaceError::FileOpen`] if it has any open handle.
pub fn unlink(txn: &mut Transaction<'_>, path: &NodePath) -> HyperspaceResult<()> {
    let Some((parent, name)) = path.split_parent() else {
        return Err(HyperspaceError::BadPathname("cannot unlink the root".to_owned()));
    };
    let record = require_node(txn, path)?;
    if !record.open_handles.is_empty() {
        return Err(HyperspaceError::FileOpen(path.to_string()));
    }
    node::delete_node(txn, path)?;
    txn.delete(&child_key(&parent, name))?;
    Ok(())
}

/// Test whether `path` currently exists.
///
/// # Errors
///
/// Returns a [`HyperspaceError`] only if the transaction itself fails.
pub fn exists(txn: &mut Transaction<'_>, path: &NodePath) -> HyperspaceResult<bool> {
    Ok(node::get_node(txn, path)?.is_some())
}

/// List the immediate children of a directory handle's node.
///
/// # Errors
///
/// Returns a [`HyperspaceError`] only if the transaction itself fails.
pub fn readdir(txn: &mut Transaction<'_>, parent: &NodePath) -> HyperspaceResult<Vec<String>> {
    let prefix = child_prefix(parent);
    let rows = txn.scan_prefix(&prefix)?;
    Ok(rows
        .into_iter()
        .filter_map(|(key, _)| {
            key.get(prefix.len()..)
                .map(|tail| String::from_utf8_lossy(tail).into_owned())
        })
        .collect())
}

/// The result of a successful [`open`].
#[derive(Debug, Clone, Copy)]
pub struct OpenResult {
    /// The newly allocated handle.
    pub handle: HandleId,
    /// True if this call created the node.
    pub created: bool,
}

/// Open (optionally creating) `path`, allocating a new handle registered
/// on both the node and the owning session.
///
/// Does not perform atomic locking even if `flags` requests it; the
/// caller runs `hyperspace_lock::lock_in_txn` afterwards, in the same
/// transaction, when `flags.wants_atomic_lock()`.
///
/// # Errors
///
/// Returns [`HyperspaceError::FileNotFound`] if the parent is missing and
/// `path` does not already exist, [`HyperspaceError::FileExists`] if
/// `CREATE|EXCL` is set and `path` exists, or [`HyperspaceError::BadPathname`]
/// if `TEMP` is set and `path` already exists (an ephemeral node cannot be
/// reopened once created).
pub fn open(
    txn: &mut Transaction<'_>,
    session: hyperspace_core::SessionId,
    path: &NodePath,
    flags: OpenFlags,
    event_mask: hyperspace_core::EventMask,
    initial_attrs: &[(String, Vec<u8>)],
) -> HyperspaceResult<OpenResult> {
    let existing = node::get_node(txn, path)?;

    if flags.has(OpenFlags::TEMP) && existing.is_some() {
        return Err(HyperspaceError::BadPathname(format!(
            "{path} already exists and cannot be reopened as ephemeral"
        )));
    }
    if flags.has(OpenFlags::CREATE) && flags.has(OpenFlags::EXCL) && existing.is_some() {
        return Err(HyperspaceError::FileExists(path.to_string()));
    }

    let created = existing.is_none();
    if created {
        if !flags.has(OpenFlags::CREATE) {
            return Err(HyperspaceError::FileNotFound(path.to_string()));
        }
        if let Some((parent, name)) = path.split_parent() {
            require_node(txn, &parent)?;
            txn.put(&child_key(&parent, name), &[])?;
        }
        let ephemeral = flags.has(OpenFlags::TEMP);
        node::put_node(txn, path, &NodeRecord::new(ephemeral, Utc::now()))?;
        for (name, value) in initial_attrs {
            crate::attr::attr_set(txn, path, name, value)?;
        }
    }

    let handle_id = HandleId::new(bump_counter_in_txn(txn, HANDLE_COUNTER_KEY)?);
    handle::put_handle(
        txn,
        handle_id,
        &HandleRecord { session, node: path.clone(), flags, event_mask },
    )?;

    let mut record = node::get_node(txn, path)?.expect("just created or pre-existing");
    record.open_handles.insert(handle_id);
    node::put_node(txn, path, &record)?;

    Ok(OpenResult { handle: handle_id, created })
}

/// Remove `handle` from its node and session (step 1 of close; lock
/// release and ephemeral cleanup are separate, later steps).
///
/// # Errors
///
/// Returns a [`HyperspaceError`] only if the transaction itself fails or
/// the handle's node record is missing (a consistency bug, not a normal
/// precondition failure).
pub fn detach_handle_from_node(
    txn: &mut Transaction<'_>,
    node_path: &NodePath,
    handle_id: HandleId,
) -> HyperspaceResult<()> {
    if let Some(mut record) = node::get_node(txn, node_path)? {
        record.open_handles.remove(&handle_id);
        node::put_node(txn, node_path, &record)?;
    }
    Ok(())
}

/// Step 3 of handle destruction: if `path` is ephemeral and now
/// unreferenced, delete it and its parent child-marker, returning the
/// parent so the caller can emit `child-removed`.
///
/// # Errors
///
/// Returns a [`HyperspaceError`] only if the transaction itself fails.
pub fn cleanup_if_unreferenced_ephemeral(
    txn: &mut Transaction<'_>,
    path: &NodePath,
) -> HyperspaceResult<Option<NodePath>> {
    let Some(record) = node::get_node(txn, path)? else { return Ok(None) };
    if !record.ephemeral || !record.is_unreferenced() {
        return Ok(None);
    }
    let Some((parent, name)) = path.split_parent() else { return Ok(None) };
    node::delete_node(txn, path)?;
    txn.delete(&child_key(&parent, name))?;
    Ok(Some(parent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::{EventMask, SessionId};
    use hyperspace_storage::Store;

    fn open_flags(bits: u32) -> OpenFlags {
        OpenFlags(bits)
    }

    #[test]
    fn mkdir_requires_an_existing_parent() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let mut txn = store.begin().unwrap();
        let path = NodePath::parse("/missing/child").unwrap();
        assert!(matches!(mkdir(&mut txn, &path), Err(HyperspaceError::BadPathname(_))));
    }

    #[test]
    fn mkdir_then_exists_then_unlink() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let root = NodePath::root();
        let mut txn = store.begin().unwrap();
        node::put_node(&mut txn, &root, &NodeRecord::new(false, Utc::now())).unwrap();

        let path = NodePath::parse("/test").unwrap();
        mkdir(&mut txn, &path).unwrap();
        assert!(exists(&mut txn, &path).unwrap());
        assert_eq!(readdir(&mut txn, &root).unwrap(), vec!["test".to_owned()]);

        unlink(&mut txn, &path).unwrap();
        assert!(!exists(&mut txn, &path).unwrap());
    }

    #[test]
    fn unlink_fails_while_a_handle_is_open() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let root = NodePath::root();
        let mut txn = store.begin().unwrap();
        node::put_node(&mut txn, &root, &NodeRecord::new(false, Utc::now())).unwrap();
        let path = NodePath::parse("/test").unwrap();
        mkdir(&mut txn, &path).unwrap();

        let result = open(
            &mut txn,
            SessionId::new(1),
            &path,
            open_flags(OpenFlags::READ),
            EventMask::none(),
            &[],
        )
        .unwrap();
        assert!(!result.created);
        assert!(matches!(unlink(&mut txn, &path), Err(HyperspaceError::FileOpen(_))));
    }

    #[test]
    fn ephemeral_node_is_cleaned_up_once_unreferenced() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let root = NodePath::root();
        let mut txn = store.begin().unwrap();
        node::put_node(&mut txn, &root, &NodeRecord::new(false, Utc::now())).unwrap();
        let path = NodePath::parse("/lock").unwrap();

        let result = open(
            &mut txn,
            SessionId::new(1),
            &path,
            open_flags(OpenFlags::READ | OpenFlags::CREATE | OpenFlags::TEMP),
            EventMask::none(),
            &[],
        )
        .unwrap();
        assert!(result.created);

        detach_handle_from_node(&mut txn, &path, result.handle).unwrap();
        let parent = cleanup_if_unreferenced_ephemeral(&mut txn, &path).unwrap();
        assert_eq!(parent, Some(root));
        assert!(!exists(&mut txn, &path).unwrap());
    }
}
