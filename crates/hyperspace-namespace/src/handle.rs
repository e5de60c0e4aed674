//! The per-handle record: which session opened it, on which node, and
//! with what flags and event mask.

use hyperspace_core::{EventMask, HandleId, NodePath, OpenFlags, SessionId};
use hyperspace_storage::{StorageError, StorageResult, Transaction};
use serde::{Deserialize, Serialize};

/// A single open handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleRecord {
    /// The session that opened this handle.
    pub session: SessionId,
    /// The node this handle refers to.
    pub node: NodePath,
    /// Flags the handle was opened with.
    pub flags: OpenFlags,
    /// Events this handle wants to be notified about.
    pub event_mask: EventMask,
}

fn handle_key(id: HandleId) -> Vec<u8> {
    let mut key = b"h:".to_vec();
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

fn session_handle_key(session: SessionId, id: HandleId) -> Vec<u8> {
    let mut key = b"sh:".to_vec();
    key.extend_from_slice(&session.get().to_be_bytes());
    key.push(0);
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

fn session_handle_prefix(session: SessionId) -> Vec<u8> {
    let mut key = b"sh:".to_vec();
    key.extend_from_slice(&session.get().to_be_bytes());
    key.push(0);
    key
}

/// Read the record for `id`, if it exists.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails or the stored
/// record is corrupt.
pub fn get_handle(txn: &mut Transaction<'_>, id: HandleId) -> StorageResult<Option<HandleRecord>> {
    let Some(bytes) = txn.get(&handle_key(id))? else { return Ok(None) };
    let record = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Some(record))
}

/// Write `record` for `id`.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn put_handle(
    txn: &mut Transaction<'_>,
    id: HandleId,
    record: &HandleRecord,
) -> StorageResult<()> {
    let bytes =
        serde_json::to_vec(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
    txn.put(&handle_key(id), &bytes)?;
    txn.put(&session_handle_key(record.session, id), &[])
}

/// Delete the record for `id`. Idempotent: deleting an already-absent
/// handle is not an error (`spec.md` §4.2: "destruction is idempotent").
///
/// The session->handle index entry is only removed here if the caller
/// still knows the owning session; when it doesn't, pass `None` and rely
/// on [`list_session_handles`] tolerating a dangling index entry (it
/// re-checks the handle record before returning it).
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn delete_handle(
    txn: &mut Transaction<'_>,
    id: HandleId,
    session: Option<SessionId>,
) -> StorageResult<()> {
    txn.delete(&handle_key(id))?;
    if let Some(session) = session {
        txn.delete(&session_handle_key(session, id))?;
    }
    Ok(())
}

/// List the handles a session currently has open, read back from the
/// `HandleRecord`s themselves (the index is a lookup aid, not a source of
/// truth, so a dangling entry for an already-deleted handle is skipped).
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails or a stored record
/// is corrupt.
pub fn list_session_handles(
    txn: &mut Transaction<'_>,
    session: SessionId,
) -> StorageResult<Vec<HandleId>> {
    let prefix = session_handle_prefix(session);
    let rows = txn.scan_prefix(&prefix)?;
    let mut handles = Vec::with_capacity(rows.len());
    for (key, _) in rows {
        let Some(tail) = key.get(prefix.len()..) else { continue };
        let Ok(bytes) = <[u8; 8]>::try_from(tail) else { continue };
        let id = HandleId::new(u64::from_be_bytes(bytes));
        if get_handle(txn, id)?.is_some() {
            handles.push(id);
        }
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_storage::Store;

    #[test]
    fn roundtrips_through_the_store() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let id = HandleId::new(1);
        let record = HandleRecord {
            session: SessionId::new(1),
            node: NodePath::parse("/test").unwrap(),
            flags: OpenFlags(OpenFlags::READ),
            event_mask: EventMask::none(),
        };

        let mut txn = store.begin().unwrap();
        put_handle(&mut txn, id, &record).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(get_handle(&mut txn, id).unwrap().is_some());
        assert_eq!(list_session_handles(&mut txn, record.session).unwrap(), vec![id]);
        delete_handle(&mut txn, id, Some(record.session)).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(get_handle(&mut txn, id).unwrap().is_none());
        assert!(list_session_handles(&mut txn, record.session).unwrap().is_empty());
        // Deleting again is not an error.
        delete_handle(&mut txn, id, Some(record.session)).unwrap();
    }
}
