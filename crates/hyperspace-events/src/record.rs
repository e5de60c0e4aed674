//! The persisted event record: an [`Event`] plus the count of recipient
//! handles that have not yet acknowledged it.

use hyperspace_core::{Event, EventId, EventKind, HandleId};
use hyperspace_storage::{bump_counter_in_txn, StorageError, StorageResult, Transaction};
use serde::{Deserialize, Serialize};

const EVENT_COUNTER_KEY: &[u8] = b"ctr:event";

/// An event together with its outstanding-acknowledgement count
/// (`spec.md` §4.4 step 5). The record is deleted once the count reaches
/// zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// The event itself.
    pub event: Event,
    /// Number of recipient handles that have not yet acknowledged this
    /// event via their session's keepalive.
    pub outstanding: u32,
}

fn event_key(id: EventId) -> Vec<u8> {
    let mut key = b"e:".to_vec();
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

/// Allocate an id, build the record, and persist it, all within `txn`
/// (`spec.md` §4.4 steps 1-4; the recipient set itself is computed by the
/// caller, which alone knows which handles are open on the affected
/// node).
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails.
pub fn record(
    txn: &mut Transaction<'_>,
    kind: EventKind,
    recipients: &[HandleId],
    created_at: chrono::DateTime<chrono::Utc>,
) -> StorageResult<Event> {
    let id = EventId::new(bump_counter_in_txn(txn, EVENT_COUNTER_KEY)?);
    let event = Event { id, kind, created_at };
    let record = EventRecord { event: event.clone(), outstanding: recipients.len() as u32 };
    let bytes = serde_json::to_vec(&record)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    txn.put(&event_key(id), &bytes)?;
    Ok(event)
}

/// Decrement the outstanding-acknowledgement count for `event_id`,
/// deleting the record once it reaches zero.
///
/// # Errors
///
/// Returns a [`StorageError`] if the transaction fails or the record is
/// missing (acknowledging an event twice past its deletion is a caller
/// bug, not a transient condition).
pub fn decrement(txn: &mut Transaction<'_>, event_id: EventId) -> StorageResult<bool> {
    let key = event_key(event_id);
    let Some(bytes) = txn.get(&key)? else {
        return Ok(true);
    };
    let mut record: EventRecord =
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    record.outstanding = record.outstanding.saturating_sub(1);
    if record.outstanding == 0 {
        txn.delete(&key)?;
        Ok(true)
    } else {
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        txn.put(&key, &bytes)?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperspace_storage::Store;

    #[test]
    fn record_and_decrement_to_deletion() {
        let store = Store::open_ephemeral_for_tests().unwrap();
        let mut txn = store.begin().unwrap();
        let event = record(
            &mut txn,
            EventKind::LockReleased,
            &[HandleId::new(1), HandleId::new(2)],
            chrono::Utc::now(),
        )
        .unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(!decrement(&mut txn, event.id).unwrap());
        txn.commit().unwrap();

        let mut txn = store.begin().unwrap();
        assert!(decrement(&mut txn, event.id).unwrap());
        txn.commit().unwrap();
    }
}
