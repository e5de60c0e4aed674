//! Request context: the identifiers `spec.md` operations are keyed on,
//! carried through a `tracing` span so every log line emitted while
//! handling a request can be correlated back to it.

use tracing::Span;

/// A correlatable context for one inbound request or background
/// operation (e.g. `tick`).
///
/// Fields map onto the identifiers most `spec.md` components key their
/// state on: the owning session, the handle a request operates through,
/// the node path it targets, and the event id it concerns. All are
/// optional since most operations only touch a subset.
#[derive(Debug, Clone)]
pub struct RequestContext {
    component: String,
    operation: Option<String>,
    request_id: uuid::Uuid,
    session_id: Option<u64>,
    handle: Option<u64>,
    node: Option<String>,
    event_id: Option<u64>,
}

impl RequestContext {
    /// Start a new context for `component` (e.g. `"lock_manager"`,
    /// `"session_manager"`), generating a fresh request id.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: None,
            request_id: uuid::Uuid::new_v4(),
            session_id: None,
            handle: None,
            node: None,
            event_id: None,
        }
    }

    /// Attach the operation name (e.g. `"lock"`, `"open"`, `"tick"`).
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attach the owning session id.
    #[must_use]
    pub fn with_session(mut self, session_id: u64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attach the handle id the request operates through.
    #[must_use]
    pub fn with_handle(mut self, handle: u64) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Attach the node path the request targets.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attach the event id the request concerns (e.g. an acknowledgement).
    #[must_use]
    pub fn with_event(mut self, event_id: u64) -> Self {
        self.event_id = Some(event_id);
        self
    }

    /// The request id generated at construction.
    #[must_use]
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Build the `tracing` span carrying every field set so far.
    ///
    /// Fields left unset are recorded as `tracing::field::Empty` rather
    /// than omitted, so downstream subscribers see a stable field set
    /// across every span this type produces.
    #[must_use]
    pub fn span(&self) -> Span {
        let span = tracing::info_span!(
            "request",
            component = %self.component,
            request_id = %self.request_id,
            operation = tracing::field::Empty,
            session_id = tracing::field::Empty,
            handle = tracing::field::Empty,
            node = tracing::field::Empty,
            event_id = tracing::field::Empty,
        );
        if let Some(operation) = &self.operation {
            span.record("operation", operation.as_str());
        }
        if let Some(session_id) = self.session_id {
            span.record("session_id", session_id);
        }
        if let Some(handle) = self.handle {
            span.record("handle", handle);
        }
        if let Some(node) = &self.node {
            span.record("node", node.as_str());
        }
        if let Some(event_id) = self.event_id {
            span.record("event_id", event_id);
        }
        span
    }

    /// Build a guard over the context's span that logs elapsed wall-clock
    /// time when dropped. Does not itself enter the span — pair it with
    /// `let _entered = ctx.span().enter();` where the borrow-checker
    /// allows holding a `tracing::span::Entered` across the scope.
    #[must_use]
    pub fn guard(&self) -> RequestGuard {
        RequestGuard { span: self.span(), started_at: chrono::Utc::now() }
    }
}

/// Logs a request's elapsed wall-clock time when dropped, within its
/// originating span.
pub struct RequestGuard {
    span: Span,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let elapsed_ms = (chrono::Utc::now() - self.started_at).num_milliseconds();
        self.span.in_scope(|| tracing::debug!(elapsed_ms, "request complete"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_every_optional_field() {
        let ctx = RequestContext::new("lock_manager")
            .with_operation("lock")
            .with_session(1)
            .with_handle(2)
            .with_node("/l")
            .with_event(3);
        let _span = ctx.span();
    }

    #[test]
    fn request_ids_are_unique() {
        let a = RequestContext::new("x");
        let b = RequestContext::new("x");
        assert_ne!(a.request_id(), b.request_id());
    }
}
