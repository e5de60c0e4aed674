//! The persisted session record and the notifications queued against it
//! (`spec.md` §3, "Session" and "Notification").
//!
//! The lease deadline itself is *not* persisted: a server restart tears
//! down every datagram socket and TCP connection the client held, so a
//! session's wall-clock deadline has no meaning to recover across a
//! crash. What must survive a crash is only the terminal fact that a
//! session reached `expired`, so a racing restart does not resurrect a
//! session a concurrent `tick` had already torn down.

use hyperspace_core::{Event, HandleId};
use hyperspace_storage::{StorageError, StorageResult, Transaction};
use serde::{Deserialize, Serialize};

/// The server-observable session state (`spec.md` §4.1: "initialising →
/// safe ⇄ (internal only) → expired"; `jeopardy` is a client-side concept
/// only and never appears here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created by the first keepalive datagram; no handshake yet.
    Initialising,
    /// Handshake complete, lease current.
    Safe,
    /// Lease lapsed or the session was explicitly destroyed. Terminal.
    Expired,
}

/// The persisted half of a session: its client endpoint, optional name,
/// and state. The lease deadline and notification queue live only in the
/// in-memory [`crate::manager::SessionEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The client's datagram endpoint, as text (`SocketAddr::to_string`).
    pub addr: String,
    /// Human-readable name set by the initial handshake, if any.
    pub name: Option<String>,
    /// Current state.
    pub state: SessionState,
}

/// A notification queued against a session: a handle id paired with the
/// event it should be told about (`spec.md` §3, "Notification").
#[derive(Debug, Clone)]
pub struct QueuedNotification {
    /// The handle the event concerns.
    pub handle: HandleId,
    /// The event itself.
    pub event: Event,
}

fn session_key(id: hyperspace_core::SessionId) -> Vec<u8> {
    let mut key = b"s:".to_vec();
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

/// Read the record for `id`, if it exists.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails or the stored
/// record is corrupt.
pub fn get_session(
    txn: &mut Transaction<'_>,
    id: hyperspace_core::SessionId,
) -> StorageResult<Option<SessionRecord>> {
    let Some(bytes) = txn.get(&session_key(id))? else { return Ok(None) };
    let record = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(Some(record))
}

/// Write `record` for `id`.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn put_session(
    txn: &mut Transaction<'_>,
    id: hyperspace_core::SessionId,
    record: &SessionRecord,
) -> StorageResult<()> {
    let bytes =
        serde_json::to_vec(record).map_err(|e| StorageError::Serialization(e.to_string()))?;
    txn.put(&session_key(id), &bytes)
}

/// Delete the record for `id`. Idempotent.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn delete_session(
    txn: &mut Transaction<'_>,
    id: hyperspace_core::SessionId,
) -> StorageResult<()> {
    txn.delete(&session_key(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_core::SessionId;
    use hyperspace_storage::Store;

    #[test]
    fn roundtrips_through_the_store() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let id = SessionId::new(1);
        let record = SessionRecord {
            addr: "127.0.0.1:4000".to_owned(),
            name: None,
            state: SessionState::Initialising,
        };

        let mut txn = store.begin().unwrap();
        put_session(&mut txn, id, &record).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        let read_back = get_session(&mut txn, id).unwrap().unwrap();
        assert_eq!(read_back.state, SessionState::Initialising);

        delete_session(&mut txn, id).unwrap();
        txn.commit().unwrap();
        let mut txn = store.begin().unwrap();
        assert!(get_session(&mut txn, id).unwrap().is_none());
    }
}
