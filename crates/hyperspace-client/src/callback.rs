//! User-supplied callbacks (`spec.md` §4.5): one set per session for
//! lease-state transitions, one per handle for delivered events.

use hyperspace_core::Event;

use crate::state::LeaseState;

/// Invoked by the keepalive engine as the session's lease state changes.
/// All three methods run on the engine's single reactor thread, so they
/// must not block; heavy work should be handed off to another task.
pub trait SessionCallback: Send + Sync {
    /// The lease is overdue and the session has entered `jeopardy`;
    /// application calls are now blocking.
    fn jeopardy(&self) {}

    /// A reply arrived during the grace period; the session is `safe`
    /// again and blocked calls may proceed.
    fn safe(&self) {}

    /// The grace period elapsed, or the server reported the session
    /// gone. If reconnect mode is off this is terminal.
    fn expired(&self) {}
}

/// A no-op [`SessionCallback`], for callers that only care about the
/// synchronous API and poll [`crate::Client::lease_state`] instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSessionCallback;

impl SessionCallback for NullSessionCallback {}

/// Invoked once per notification delivered for a specific handle
/// (`spec.md` §4.5 "Dispatches the event to the user callback associated
/// with the handle").
pub trait HandleCallback: Send + Sync {
    /// `event` already passed the idempotent-replay check
    /// (`event.id > last_known_event_id` at delivery time).
    fn on_event(&self, event: &Event);
}

impl<F> HandleCallback for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event);
    }
}
