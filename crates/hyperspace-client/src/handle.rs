//! The client's local mirror of its own open handles: just enough state
//! to route an inbound notification to the right callback and to know
//! what a reconnect must discard.

use std::sync::Arc;

use dashmap::DashMap;
use hyperspace_core::{EventMask, HandleId};

use crate::callback::HandleCallback;

/// What the client remembers locally about one of its own open handles.
pub struct LocalHandle {
    /// The node path this handle was opened against, for diagnostics.
    pub path: String,
    /// The event mask requested at open time.
    pub event_mask: EventMask,
    /// The callback notifications for this handle are dispatched to.
    pub callback: Arc<dyn HandleCallback>,
}

/// An unknown-handle sighting, recorded so the grace-period crash check
/// in `spec.md` §4.5 / §9 can tell a one-off race from a persistent
/// server bug.
#[derive(Debug, Clone, Copy)]
pub struct BadNotificationSighting {
    /// When this sighting was first recorded.
    pub first_seen: std::time::Instant,
}

/// Thread-safe table of this engine's locally known handles.
#[derive(Default)]
pub struct HandleTable {
    handles: DashMap<HandleId, Arc<LocalHandle>>,
    bad_notifications: DashMap<HandleId, BadNotificationSighting>,
}

impl HandleTable {
    /// Build an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly opened handle.
    pub fn insert(
        &self,
        handle: HandleId,
        path: String,
        event_mask: EventMask,
        callback: Arc<dyn HandleCallback>,
    ) {
        self.handles.insert(handle, Arc::new(LocalHandle { path, event_mask, callback }));
    }

    /// Look up a handle's local state.
    #[must_use]
    pub fn get(&self, handle: HandleId) -> Option<Arc<LocalHandle>> {
        self.handles.get(&handle).map(|entry| Arc::clone(&entry))
    }

    /// Forget a closed handle.
    pub fn remove(&self, handle: HandleId) {
        self.handles.remove(&handle);
        self.bad_notifications.remove(&handle);
    }

    /// Drop every locally tracked handle, per
    /// [`crate::state::ReconnectPolicy::ClearHandles`].
    pub fn clear(&self) {
        self.handles.clear();
        self.bad_notifications.clear();
    }

    /// Record a notification for a handle this table does not know
    /// about, returning how long ago the first such sighting for this
    /// handle was (`Duration::ZERO` if this is the first).
    pub fn record_bad_notification(&self, handle: HandleId) -> std::time::Duration {
        let now = std::time::Instant::now();
        let first_seen = self
            .bad_notifications
            .entry(handle)
            .or_insert(BadNotificationSighting { first_seen: now })
            .first_seen;
        now.saturating_duration_since(first_seen)
    }

    /// Number of handles currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl HandleCallback for Noop {
        fn on_event(&self, _event: &hyperspace_core::Event) {}
    }

    #[test]
    fn insert_then_remove_forgets_the_handle() {
        let table = HandleTable::new();
        let handle = HandleId::new(1);
        table.insert(handle, "/a".to_owned(), EventMask::none(), Arc::new(Noop));
        assert!(table.get(handle).is_some());
        table.remove(handle);
        assert!(table.get(handle).is_none());
    }

    #[test]
    fn bad_notification_sighting_persists_across_calls() {
        let table = HandleTable::new();
        let handle = HandleId::new(7);
        let first = table.record_bad_notification(handle);
        assert_eq!(first, std::time::Duration::ZERO);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = table.record_bad_notification(handle);
        assert!(second >= std::time::Duration::from_millis(5));
    }

    #[test]
    fn clear_drops_everything() {
        let table = HandleTable::new();
        table.insert(HandleId::new(1), "/a".to_owned(), EventMask::none(), Arc::new(Noop));
        table.record_bad_notification(HandleId::new(2));
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.record_bad_notification(HandleId::new(2)), std::time::Duration::ZERO);
    }
}
