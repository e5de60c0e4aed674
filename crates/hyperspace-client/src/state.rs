//! The client-side lease state machine (`spec.md` §4.5): `disconnected →
//! safe ⇄ jeopardy → expired`, with `disconnected` re-entry when
//! reconnect mode is configured.
//!
//! This is deliberately richer than [`hyperspace_session::SessionState`]
//! (server-side): the server only ever considers a session live or
//! expired, while `jeopardy` exists purely so the client can suspend
//! application work during a plausible transient outage instead of
//! declaring the session dead at the first missed reply.

use std::fmt;

/// The engine's current view of its session's health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// No session established yet, or the TCP control connection is down
    /// and reconnect mode is off (terminal unless the caller reconnects
    /// manually).
    Disconnected,
    /// Lease current, handshake complete.
    Safe,
    /// A keepalive reply is overdue; application calls block until this
    /// resolves to `Safe` or `Expired`.
    Jeopardy,
    /// The grace period elapsed with no reply, or the server returned
    /// `expired-session`. Terminal unless reconnect mode starts a fresh
    /// session.
    Expired,
}

impl LeaseState {
    /// Whether application calls may proceed without blocking.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Safe)
    }

    /// Whether this state is a dead end for the current session id.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Safe => "safe",
            Self::Jeopardy => "jeopardy",
            Self::Expired => "expired",
        };
        write!(f, "{label}")
    }
}

/// What happens to the client's local handle table across a TCP
/// reconnect (`spec.md` §9, Design Notes and Open Question: "The TCP
/// reconnect path in the client clears handles before it reissues the
/// handshake, meaning prior locks are permanently lost on any disconnect
/// even when the session id is reused.").
///
/// `SPEC_FULL.md` §D records the resolution: we keep the original's
/// behavior (clear) as the default rather than inventing an undocumented
/// lock-recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Drop every locally tracked handle on reconnect; the server's own
    /// session-expiry cascade (if the session also expired) or its
    /// still-live handle table (if the session survived) is the source
    /// of truth the application must re-derive by reopening.
    #[default]
    ClearHandles,
    /// Disabled: a TCP disconnect is terminal for this engine instance.
    NoReconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_safe_is_usable() {
        assert!(LeaseState::Safe.is_usable());
        assert!(!LeaseState::Jeopardy.is_usable());
        assert!(!LeaseState::Expired.is_usable());
        assert!(!LeaseState::Disconnected.is_usable());
    }

    #[test]
    fn only_expired_is_terminal() {
        assert!(LeaseState::Expired.is_terminal());
        assert!(!LeaseState::Jeopardy.is_terminal());
    }
}
