//! The synchronous-feeling client API (`spec.md` §4.5, §4.6): one
//! [`Client`] per session, composing the UDP [`KeepaliveLoop`] with the
//! TCP [`RequestChannel`] and the local [`HandleTable`].
//!
//! A call blocks while the lease is in `jeopardy` rather than racing the
//! server, then issues its request over the TCP channel and maps the
//! reply back into the caller's view of a handle, an attribute, or a
//! lock outcome.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyperspace_core::{EventMask, HandleId, LockMode, OpenFlags};
use hyperspace_proto::{Reply, Request};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::callback::{HandleCallback, NullSessionCallback, SessionCallback};
use crate::connection::RequestChannel;
use crate::error::ClientError;
use crate::handle::HandleTable;
use crate::keepalive::KeepaliveLoop;
use crate::state::{LeaseState, ReconnectPolicy};

/// The result of a successful `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenResult {
    /// The newly allocated handle.
    pub handle: HandleId,
    /// Whether this call created the node.
    pub created: bool,
    /// Set if the open requested an atomic lock and it was granted.
    pub lock_generation: Option<u64>,
}

/// The result of a `lock` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Granted immediately (or the enqueued request was later granted).
    Granted {
        /// The generation assigned at grant.
        generation: u64,
    },
    /// A `try_lock` request found the node unavailable.
    Busy,
    /// A blocking request was enqueued; the grant arrives later as a
    /// `lock-granted` notification on the handle's event mask.
    Pending,
}

struct Inner {
    channel: RwLock<RequestChannel>,
    keepalive: KeepaliveLoop,
    handles: Arc<HandleTable>,
    server_addr: SocketAddr,
    client_name: String,
    reconnect: ReconnectPolicy,
    next_thread_group: AtomicU32,
}

/// The node/session facade applications use: one instance per logical
/// connection to the coordination service. Cheaply [`Clone`]-able; every
/// clone shares the same keepalive loop, request channel, and handle
/// table.
#[derive(Clone)]
pub struct Client(Arc<Inner>);

/// How many consecutive attempts [`reconnect_loop`] makes to redial and
/// re-handshake before giving up and leaving the channel disconnected
/// for the next caller's request to retry.
const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

impl Client {
    /// Establish a new session against `server_addr`: perform the UDP
    /// handshake, dial the TCP request channel, and bind it to the
    /// session the handshake assigned.
    ///
    /// # Errors
    ///
    /// Returns a [`std::io::Error`] if either socket cannot be
    /// established, or [`ClientError`] if the TCP handshake request
    /// itself fails.
    pub async fn connect(
        server_addr: SocketAddr,
        client_name: impl Into<String>,
        keep_alive_interval: Duration,
        lease_interval: Duration,
        grace_period: Duration,
        reconnect: ReconnectPolicy,
    ) -> Result<Self, ClientError> {
        Self::connect_with_callback(
            server_addr,
            client_name,
            keep_alive_interval,
            lease_interval,
            grace_period,
            reconnect,
            Arc::new(NullSessionCallback),
        )
        .await
    }

    /// As [`Self::connect`], but with a caller-supplied
    /// [`SessionCallback`] for lease-state transitions.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_with_callback(
        server_addr: SocketAddr,
        client_name: impl Into<String>,
        keep_alive_interval: Duration,
        lease_interval: Duration,
        grace_period: Duration,
        reconnect: ReconnectPolicy,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<Self, ClientError> {
        let handles = Arc::new(HandleTable::new());

        let (keepalive, session_id) = KeepaliveLoop::start(
            server_addr,
            keep_alive_interval,
            lease_interval,
            grace_period,
            Arc::clone(&handles),
            callback,
        )
        .await?;

        let channel = RequestChannel::connect(server_addr).await?;
        let client_name = client_name.into();
        channel
            .call(
                Request::Handshake { session_id, client_name: client_name.clone() },
                thread_group_for(session_id.get()),
            )
            .await?;
        info!(session = session_id.get(), %client_name, "request channel bound to session");

        let client = Self(Arc::new(Inner {
            channel: RwLock::new(channel),
            keepalive,
            handles,
            server_addr,
            client_name,
            reconnect,
            next_thread_group: AtomicU32::new(thread_group_for(session_id.get())),
        }));
        client.spawn_reconnect_watcher();
        Ok(client)
    }

    /// The session id negotiated at connect time.
    #[must_use]
    pub fn session_id(&self) -> hyperspace_core::SessionId {
        self.0.keepalive.session_id()
    }

    /// The engine's current view of its lease's health.
    #[must_use]
    pub fn lease_state(&self) -> LeaseState {
        self.0.keepalive.state()
    }

    fn spawn_reconnect_watcher(&self) {
        if self.0.reconnect == ReconnectPolicy::NoReconnect {
            return;
        }
        let inner = Arc::clone(&self.0);
        tokio::spawn(async move {
            loop {
                let disconnected = Arc::clone(&inner.channel.read().await.disconnected);
                disconnected.notified().await;
                warn!("request channel dropped, clearing local handle table per reconnect policy");
                inner.handles.clear();
                reconnect_loop(&inner).await;
            }
        });
    }

    async fn call(&self, request: Request) -> Result<Reply, ClientError> {
        self.0.keepalive.await_resolved().await;
        if self.0.keepalive.state().is_terminal() {
            return Err(ClientError::SessionExpired);
        }
        let thread_group = self.0.next_thread_group.load(Ordering::Relaxed);
        let channel = self.0.channel.read().await;
        channel.call(request, thread_group).await
    }

    /// Open (optionally creating) `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on any protocol, session, or precondition
    /// failure (`spec.md` §7).
    pub async fn open(
        &self,
        path: impl Into<String>,
        flags: OpenFlags,
        event_mask: EventMask,
        initial_attrs: Vec<(String, Vec<u8>)>,
        callback: Arc<dyn HandleCallback>,
    ) -> Result<OpenResult, ClientError> {
        let path = path.into();
        let reply = self
            .call(Request::Open { path: path.clone(), flags: flags.0, event_mask: event_mask.0, initial_attrs })
            .await?;
        let Reply::Open { handle, created, lock_generation } = reply else {
            return Err(protocol_mismatch("Open"));
        };
        self.0.handles.insert(handle, path, event_mask, callback);
        Ok(OpenResult { handle, created, lock_generation })
    }

    /// Close `handle`, forgetting its local notification routing.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn close(&self, handle: HandleId) -> Result<(), ClientError> {
        self.call(Request::Close { handle }).await?;
        self.0.handles.remove(handle);
        Ok(())
    }

    /// Create an interior node without opening it.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn mkdir(&self, path: impl Into<String>) -> Result<(), ClientError> {
        self.call(Request::Mkdir { path: path.into() }).await?;
        Ok(())
    }

    /// Remove a node.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn unlink(&self, path: impl Into<String>) -> Result<(), ClientError> {
        self.call(Request::Delete { path: path.into() }).await?;
        Ok(())
    }

    /// Test whether `path` exists.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn exists(&self, path: impl Into<String>) -> Result<bool, ClientError> {
        let reply = self.call(Request::Exists { path: path.into() }).await?;
        as_bool(reply, "Exists")
    }

    /// List the children of `handle`'s node.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn readdir(&self, handle: HandleId) -> Result<Vec<String>, ClientError> {
        let reply = self.call(Request::Readdir { handle }).await?;
        as_names(reply, "Readdir")
    }

    /// Set an extended attribute on `handle`'s node.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn attr_set(
        &self,
        handle: HandleId,
        name: impl Into<String>,
        value: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.call(Request::AttrSet { handle, name: name.into(), value }).await?;
        Ok(())
    }

    /// Read an extended attribute.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn attr_get(&self, handle: HandleId, name: impl Into<String>) -> Result<Vec<u8>, ClientError> {
        let reply = self.call(Request::AttrGet { handle, name: name.into() }).await?;
        match reply {
            Reply::AttrValue { value } => Ok(value),
            _ => Err(protocol_mismatch("AttrGet")),
        }
    }

    /// Delete an extended attribute.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn attr_del(&self, handle: HandleId, name: impl Into<String>) -> Result<(), ClientError> {
        self.call(Request::AttrDel { handle, name: name.into() }).await?;
        Ok(())
    }

    /// Test whether an extended attribute exists.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn attr_exists(&self, handle: HandleId, name: impl Into<String>) -> Result<bool, ClientError> {
        let reply = self.call(Request::AttrExists { handle, name: name.into() }).await?;
        as_bool(reply, "AttrExists")
    }

    /// List every extended attribute on `handle`'s node.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn attr_list(&self, handle: HandleId) -> Result<Vec<String>, ClientError> {
        let reply = self.call(Request::AttrList { handle }).await?;
        as_names(reply, "AttrList")
    }

    /// Acquire a lock on `handle`'s node.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn lock(&self, handle: HandleId, mode: LockMode, try_lock: bool) -> Result<LockOutcome, ClientError> {
        let reply = self.call(Request::Lock { handle, mode, try_lock }).await?;
        let Reply::Lock { status, generation } = reply else {
            return Err(protocol_mismatch("Lock"));
        };
        Ok(match status {
            0 => LockOutcome::Granted { generation: generation.unwrap_or_default() },
            1 => LockOutcome::Busy,
            _ => LockOutcome::Pending,
        })
    }

    /// Release `handle`'s held lock.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn release(&self, handle: HandleId) -> Result<(), ClientError> {
        self.call(Request::Release { handle }).await?;
        Ok(())
    }

    /// Cancel `handle`'s queued lock request, if any.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn cancel(&self, handle: HandleId) -> Result<(), ClientError> {
        self.call(Request::Cancel { handle }).await?;
        Ok(())
    }

    /// Validate a previously granted sequencer against current state.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn check_sequencer(
        &self,
        node: impl Into<String>,
        mode: LockMode,
        generation: u64,
    ) -> Result<bool, ClientError> {
        let reply = self.call(Request::CheckSequencer { node: node.into(), mode, generation }).await?;
        as_bool(reply, "CheckSequencer")
    }

    /// Query server liveness and the base-directory generation counter.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn status(&self) -> Result<(u64, u64), ClientError> {
        let reply = self.call(Request::Status).await?;
        match reply {
            Reply::Status { generation, session_count } => Ok((generation, session_count)),
            _ => Err(protocol_mismatch("Status")),
        }
    }
}

/// Redial the TCP request channel and re-handshake it against the
/// session the keepalive loop still believes is live. Gives up after
/// [`RECONNECT_ATTEMPTS`], leaving the stale channel in place for the
/// next caller's request to surface as [`ClientError::Disconnected`].
async fn reconnect_loop(inner: &Inner) {
    let session_id = inner.keepalive.session_id();
    for attempt in 1..=RECONNECT_ATTEMPTS {
        if inner.keepalive.state().is_terminal() {
            warn!("session expired during reconnect, abandoning request channel redial");
            return;
        }
        match RequestChannel::connect(inner.server_addr).await {
            Ok(channel) => {
                let thread_group = thread_group_for(session_id.get());
                let handshake = channel.call(
                    Request::Handshake { session_id, client_name: inner.client_name.clone() },
                    thread_group,
                );
                match handshake.await {
                    Ok(_) => {
                        *inner.channel.write().await = channel;
                        info!(session = session_id.get(), attempt, "request channel reconnected");
                        return;
                    }
                    Err(error) => warn!(%error, attempt, "re-handshake failed"),
                }
            }
            Err(error) => warn!(%error, attempt, "reconnect dial failed"),
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
    error!(session = session_id.get(), "giving up on request channel reconnect");
}

fn thread_group_for(session_id: u64) -> u32 {
    session_id as u32
}

fn as_bool(reply: Reply, command: &'static str) -> Result<bool, ClientError> {
    match reply {
        Reply::Bool { value } => Ok(value),
        _ => Err(protocol_mismatch(command)),
    }
}

fn as_names(reply: Reply, command: &'static str) -> Result<Vec<String>, ClientError> {
    match reply {
        Reply::Names { names } => Ok(names),
        _ => Err(protocol_mismatch(command)),
    }
}

fn protocol_mismatch(command: &'static str) -> ClientError {
    ClientError::Server(hyperspace_core::HyperspaceError::ProtocolError(format!(
        "unexpected reply shape for {command}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_group_derives_from_session_id() {
        assert_eq!(thread_group_for(42), 42);
        assert_eq!(thread_group_for(u64::from(u32::MAX) + 1), 0);
    }

    #[test]
    fn as_bool_rejects_a_mismatched_reply() {
        assert!(as_bool(Reply::Ack, "Exists").is_err());
        assert!(as_bool(Reply::Bool { value: true }, "Exists").unwrap());
    }

    #[test]
    fn as_names_rejects_a_mismatched_reply() {
        assert!(as_names(Reply::Ack, "Readdir").is_err());
        let names = as_names(Reply::Names { names: vec!["a".to_owned()] }, "Readdir").unwrap();
        assert_eq!(names, vec!["a".to_owned()]);
    }
}
