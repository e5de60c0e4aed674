//! Ties the durable event record to the in-process bus: callers record
//! an event transactionally, then dispatch it once the transaction has
//! committed.

use hyperspace_core::{Event, EventKind, HandleId};
use hyperspace_storage::{StorageResult, Transaction};

use crate::bus::{DispatchedEvent, EventBus};
use crate::record;

/// An event recorded inside a transaction, paired with the recipients it
/// should be published to — held by the caller until its transaction has
/// actually committed (`spec.md` §4.4 step 5 runs "outside the
/// transaction", which only makes sense once the transaction exists).
pub type PendingDispatch = (Event, Vec<HandleId>);

/// Coordinates event recording and in-process delivery.
///
/// Cheap to clone: it only wraps the [`EventBus`] sender, which is
/// itself a cheap clone over a shared channel.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    bus: EventBus,
}

impl EventDispatcher {
    /// Build a dispatcher around a fresh event bus.
    #[must_use]
    pub fn new() -> Self {
        Self { bus: EventBus::new() }
    }

    /// Subscribe to the stream of dispatched events.
    #[must_use]
    pub fn subscribe(&self) -> crate::bus::EventReceiver {
        self.bus.subscribe()
    }

    /// Record `kind` as a new event addressed to `recipients`, within
    /// `txn` (`spec.md` §4.4 steps 1-4).
    ///
    /// # Errors
    ///
    /// Returns a [`hyperspace_storage::StorageError`] if the transaction
    /// fails.
    pub fn record(
        &self,
        txn: &mut Transaction<'_>,
        kind: EventKind,
        recipients: &[HandleId],
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> StorageResult<Event> {
        record::record(txn, kind, recipients, created_at)
    }

    /// Publish an already-recorded, already-committed event to every
    /// in-process subscriber (`spec.md` §4.4 step 5, the "outside the
    /// transaction" half).
    pub fn dispatch(&self, event: Event, recipients: Vec<HandleId>) {
        self.bus.publish(DispatchedEvent { event, recipients });
    }

    /// [`Self::dispatch`] every pending pair, in order. Called once the
    /// transaction that recorded them has committed successfully.
    pub fn dispatch_all(&self, pending: Vec<PendingDispatch>) {
        for (event, recipients) in pending {
            self.dispatch(event, recipients);
        }
    }

    /// Decrement the outstanding-acknowledgement count for `event_id`,
    /// deleting the record once every recipient has acknowledged it.
    ///
    /// # Errors
    ///
    /// Returns a [`hyperspace_storage::StorageError`] if the transaction
    /// fails.
    pub fn acknowledge(
        &self,
        txn: &mut Transaction<'_>,
        event_id: hyperspace_core::EventId,
    ) -> StorageResult<bool> {
        record::decrement(txn, event_id)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a lock transitioning from `previous_holders` to
/// `next_holders` should emit a `lock-acquired` event, per the
/// suppression rule in `spec.md` §4.4: only the no-holder-to-holder edge
/// emits; a shared lock gaining another shared holder does not.
#[must_use]
pub const fn lock_acquired_should_emit(previous_holders: usize, next_holders: usize) -> bool {
    previous_holders == 0 && next_holders > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquired_emits_only_on_the_first_holder() {
        assert!(lock_acquired_should_emit(0, 1));
        assert!(!lock_acquired_should_emit(1, 2));
        assert!(!lock_acquired_should_emit(1, 1));
    }
}
