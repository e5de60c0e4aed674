//! Translates a decoded [`Request`] into the namespace/lock/session
//! operation(s) it names and back into a [`Reply`] (`spec.md` §4.6,
//! §6). This is the one place that knows both the wire shape and the
//! service's internal call graph; everything it calls is plain
//! `HyperspaceResult`-returning library code.

use hyperspace_core::{
    EventMask, HandleId, HyperspaceError, HyperspaceResult, LockStatus, NodePath, OpenFlags,
    SessionId,
};
use hyperspace_proto::{Reply, Request};
use hyperspace_storage::with_retry;

use crate::state::ServerState;

fn lock_status_to_wire(status: LockStatus) -> u8 {
    match status {
        LockStatus::Granted => 0,
        LockStatus::Busy => 1,
        LockStatus::Pending => 2,
        LockStatus::Cancelled => 3,
    }
}

/// Run `request` to completion against `state`, returning the reply it
/// produces. `session` is the connection's bound session once the
/// handshake has completed, or `SessionId::new(0)` for the handshake
/// itself and for `status`, neither of which is attributed to a
/// particular session's handles.
///
/// # Errors
///
/// Returns whatever [`HyperspaceError`] the underlying operation fails
/// with, after [`with_retry`] has exhausted its attempts on a
/// transaction conflict.
pub fn dispatch(
    state: &ServerState,
    session: SessionId,
    request: Request,
) -> HyperspaceResult<Reply> {
    match request {
        Request::Handshake { session_id, client_name } => {
            state.sessions.initialize_session(session_id, client_name)?;
            Ok(Reply::Handshake)
        }

        Request::Open { path, flags, event_mask, initial_attrs } => {
            let path = NodePath::parse(&path)?;
            let flags = OpenFlags(flags);
            let event_mask = EventMask(event_mask);
            let (result, sequencer) = with_retry(|| {
                let mut txn = state.store.begin()?;
                let outcome = hyperspace_session::open_with_events(
                    &mut txn,
                    &state.dispatcher,
                    session,
                    &path,
                    flags,
                    event_mask,
                    &initial_attrs,
                )?;
                txn.commit()?;
                Ok(outcome)
            })?;
            Ok(Reply::Open {
                handle: result.handle,
                created: result.created,
                lock_generation: sequencer.map(|s| s.generation),
            })
        }

        Request::Stat { path } => {
            let path = NodePath::parse(&path)?;
            let (exists, lock_generation) = with_retry(|| {
                let mut txn = state.store.begin()?;
                let record = hyperspace_namespace::node::get_node(&mut txn, &path)?;
                txn.commit()?;
                Ok(match record {
                    Some(record) => (true, record.lock_generation),
                    None => (false, 0),
                })
            })?;
            Ok(Reply::Stat { exists, lock_generation })
        }

        Request::Cancel { handle } => {
            with_retry(|| {
                let mut txn = state.store.begin()?;
                hyperspace_lock::cancel_pending_in_txn(&mut txn, handle)?;
                txn.commit()?;
                Ok(())
            })?;
            Ok(Reply::Ack)
        }

        Request::Close { handle } => {
            hyperspace_session::destroy_handle(&state.store, &state.dispatcher, handle, Some(session))?;
            Ok(Reply::Ack)
        }

        Request::Poison { session_id } => {
            state.sessions.destroy_session(session_id)?;
            Ok(Reply::Ack)
        }

        Request::Mkdir { path } => {
            let path = NodePath::parse(&path)?;
            with_retry(|| {
                let mut txn = state.store.begin()?;
                hyperspace_session::mkdir_with_events(&mut txn, &state.dispatcher, &path)?;
                txn.commit()?;
                Ok(())
            })?;
            Ok(Reply::Ack)
        }

        Request::AttrSet { handle, name, value } => {
            with_retry(|| {
                let mut txn = state.store.begin()?;
                hyperspace_session::attr_set_with_events(
                    &mut txn,
                    &state.dispatcher,
                    handle,
                    &name,
                    &value,
                )?;
                txn.commit()?;
                Ok(())
            })?;
            Ok(Reply::Ack)
        }

        Request::AttrGet { handle, name } => {
            let value = with_retry(|| {
                let mut txn = state.store.begin()?;
                let record = require_handle(&mut txn, handle)?;
                let value = hyperspace_namespace::attr::attr_get(&mut txn, &record.node, &name)?
                    .ok_or_else(|| HyperspaceError::AttrNotFound(name.clone()))?;
                txn.commit()?;
                Ok(value)
            })?;
            Ok(Reply::AttrValue { value })
        }

        Request::AttrDel { handle, name } => {
            with_retry(|| {
                let mut txn = state.store.begin()?;
                hyperspace_session::attr_del_with_events(&mut txn, &state.dispatcher, handle, &name)?;
                txn.commit()?;
                Ok(())
            })?;
            Ok(Reply::Ack)
        }

        Request::AttrExists { handle, name } => {
            let value = with_retry(|| {
                let mut txn = state.store.begin()?;
                let record = require_handle(&mut txn, handle)?;
                let value = hyperspace_namespace::attr::attr_exists(&mut txn, &record.node, &name)?;
                txn.commit()?;
                Ok(value)
            })?;
            Ok(Reply::Bool { value })
        }

        Request::AttrList { handle } => {
            let names = with_retry(|| {
                let mut txn = state.store.begin()?;
                let record = require_handle(&mut txn, handle)?;
                let names = hyperspace_namespace::attr::attr_list(&mut txn, &record.node)?;
                txn.commit()?;
                Ok(names)
            })?;
            Ok(Reply::Names { names })
        }

        Request::Exists { path } => {
            let path = NodePath::parse(&path)?;
            let value = with_retry(|| {
                let mut txn = state.store.begin()?;
                let value = hyperspace_namespace::exists(&mut txn, &path)?;
                txn.commit()?;
                Ok(value)
            })?;
            Ok(Reply::Bool { value })
        }

        Request::Delete { path } => {
            let path = NodePath::parse(&path)?;
            with_retry(|| {
                let mut txn = state.store.begin()?;
                hyperspace_session::unlink_with_events(&mut txn, &state.dispatcher, &path)?;
                txn.commit()?;
                Ok(())
            })?;
            Ok(Reply::Ack)
        }

        Request::Readdir { handle } => {
            let names = with_retry(|| {
                let mut txn = state.store.begin()?;
                let record = require_handle(&mut txn, handle)?;
                let names = hyperspace_namespace::readdir(&mut txn, &record.node)?;
                txn.commit()?;
                Ok(names)
            })?;
            Ok(Reply::Names { names })
        }

        Request::Lock { handle, mode, try_lock } => {
            let (status, sequencer) = with_retry(|| {
                let mut txn = state.store.begin()?;
                let outcome =
                    hyperspace_lock::lock_in_txn(&mut txn, &state.dispatcher, handle, mode, try_lock)?;
                txn.commit()?;
                Ok(outcome)
            })?;
            Ok(Reply::Lock {
                status: lock_status_to_wire(status),
                generation: sequencer.map(|s| s.generation),
            })
        }

        Request::Release { handle } => {
            with_retry(|| {
                let mut txn = state.store.begin()?;
                let record = require_handle(&mut txn, handle)?;
                hyperspace_lock::release_in_txn(&mut txn, &state.dispatcher, handle, true)?;
                hyperspace_lock::grant_pending_in_txn(&mut txn, &state.dispatcher, &record.node)?;
                txn.commit()?;
                Ok(())
            })?;
            Ok(Reply::Ack)
        }

        Request::CheckSequencer { node, mode, generation } => {
            let node = NodePath::parse(&node)?;
            let sequencer = hyperspace_core::LockSequencer { node, mode, generation };
            let value = with_retry(|| {
                let mut txn = state.store.begin()?;
                let value = hyperspace_lock::check_sequencer_in_txn(&mut txn, &sequencer)?;
                txn.commit()?;
                Ok(value)
            })?;
            Ok(Reply::Bool { value })
        }

        Request::Status => Ok(Reply::Status {
            generation: state.store.generation()?,
            session_count: state.sessions.session_count() as u64,
        }),
    }
}

fn require_handle(
    txn: &mut hyperspace_storage::Transaction<'_>,
    handle_id: HandleId,
) -> HyperspaceResult<hyperspace_namespace::HandleRecord> {
    hyperspace_namespace::handle::get_handle(txn, handle_id)?
        .ok_or(HyperspaceError::InvalidHandle(handle_id.get()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use hyperspace_config::Config;
    use hyperspace_core::LockMode;
    use hyperspace_events::EventDispatcher;

    use super::*;

    fn test_state() -> ServerState {
        let store = Arc::new(hyperspace_storage::Store::open_ephemeral_for_tests().unwrap());
        {
            let mut txn = store.begin().unwrap();
            hyperspace_namespace::node::put_node(
                &mut txn,
                &NodePath::root(),
                &hyperspace_namespace::NodeRecord::new(false, chrono::Utc::now()),
            )
            .unwrap();
            txn.commit().unwrap();
        }
        let dispatcher = EventDispatcher::new();
        let sessions = Arc::new(hyperspace_session::SessionManager::new(
            store.clone(),
            dispatcher.clone(),
            Duration::from_secs(12),
        ));
        ServerState::new(store, dispatcher, sessions, Arc::new(Config::default()))
    }

    fn new_session(state: &ServerState) -> SessionId {
        let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
        state.sessions.create_session(addr).unwrap()
    }

    #[test]
    fn mkdir_exists_unlink_round_trip() {
        // spec.md S1: basic mkdir/exists/delete.
        let state = test_state();
        let session = new_session(&state);

        assert!(matches!(
            dispatch(&state, session, Request::Mkdir { path: "/test".to_owned() }).unwrap(),
            Reply::Ack
        ));
        assert_eq!(
            dispatch(&state, session, Request::Exists { path: "/test".to_owned() }).unwrap(),
            Reply::Bool { value: true }
        );

        let missing_parent = dispatch(&state, session, Request::Mkdir { path: "/test/a/b".to_owned() });
        assert!(matches!(missing_parent, Err(HyperspaceError::BadPathname(_))));

        dispatch(&state, session, Request::Mkdir { path: "/test/a".to_owned() }).unwrap();
        dispatch(&state, session, Request::Mkdir { path: "/test/a/b".to_owned() }).unwrap();

        let busy = dispatch(&state, session, Request::Delete { path: "/test".to_owned() });
        assert!(matches!(busy, Err(HyperspaceError::FileOpen(_))));

        dispatch(&state, session, Request::Delete { path: "/test/a/b".to_owned() }).unwrap();
        dispatch(&state, session, Request::Delete { path: "/test/a".to_owned() }).unwrap();
        dispatch(&state, session, Request::Delete { path: "/test".to_owned() }).unwrap();
    }

    #[test]
    fn attribute_round_trip_through_dispatch() {
        // spec.md S2: attributes.
        let state = test_state();
        let session = new_session(&state);

        let Reply::Open { handle, .. } = dispatch(
            &state,
            session,
            Request::Open {
                path: "/foo".to_owned(),
                flags: OpenFlags::CREATE | OpenFlags::WRITE,
                event_mask: 0,
                initial_attrs: vec![],
            },
        )
        .unwrap() else {
            panic!("expected Open reply");
        };

        dispatch(
            &state,
            session,
            Request::AttrSet { handle, name: "name".to_owned(), value: b"Doug Judd".to_vec() },
        )
        .unwrap();
        assert_eq!(
            dispatch(&state, session, Request::AttrGet { handle, name: "name".to_owned() }).unwrap(),
            Reply::AttrValue { value: b"Doug Judd".to_vec() }
        );
        assert!(matches!(
            dispatch(&state, session, Request::AttrGet { handle, name: "phone".to_owned() }),
            Err(HyperspaceError::AttrNotFound(_))
        ));

        dispatch(&state, session, Request::AttrDel { handle, name: "name".to_owned() }).unwrap();
        assert_eq!(
            dispatch(&state, session, Request::AttrExists { handle, name: "name".to_owned() }).unwrap(),
            Reply::Bool { value: false }
        );

        dispatch(&state, session, Request::Close { handle }).unwrap();
        dispatch(&state, session, Request::Delete { path: "/foo".to_owned() }).unwrap();
    }

    #[test]
    fn exclusive_lock_handover_through_dispatch() {
        // spec.md S3: exclusive lock handover.
        let state = test_state();
        let session_a = new_session(&state);
        let session_b = new_session(&state);
        let lock_flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::LOCK | OpenFlags::CREATE;

        let Reply::Open { handle: handle_a, .. } = dispatch(
            &state,
            session_a,
            Request::Open { path: "/l".to_owned(), flags: lock_flags, event_mask: 0, initial_attrs: vec![] },
        )
        .unwrap() else {
            panic!("expected Open reply");
        };
        let Reply::Open { handle: handle_b, .. } = dispatch(
            &state,
            session_b,
            Request::Open { path: "/l".to_owned(), flags: lock_flags, event_mask: 0, initial_attrs: vec![] },
        )
        .unwrap() else {
            panic!("expected Open reply");
        };

        let Reply::Lock { status: status_a, generation: generation_a } = dispatch(
            &state,
            session_a,
            Request::Lock { handle: handle_a, mode: LockMode::Exclusive, try_lock: true },
        )
        .unwrap() else {
            panic!("expected Lock reply");
        };
        assert_eq!(status_a, 0);
        let generation_a = generation_a.unwrap();

        let Reply::Lock { status: status_b, .. } = dispatch(
            &state,
            session_b,
            Request::Lock { handle: handle_b, mode: LockMode::Exclusive, try_lock: true },
        )
        .unwrap() else {
            panic!("expected Lock reply");
        };
        assert_eq!(status_b, 1, "second exclusive request must be busy, not granted");

        dispatch(&state, session_a, Request::Release { handle: handle_a }).unwrap();
        let Reply::Lock { status: status_b2, generation: generation_b } = dispatch(
            &state,
            session_b,
            Request::Lock { handle: handle_b, mode: LockMode::Exclusive, try_lock: true },
        )
        .unwrap() else {
            panic!("expected Lock reply");
        };
        assert_eq!(status_b2, 0);
        assert!(generation_b.unwrap() > generation_a);
    }

    #[test]
    fn status_reports_the_tracked_session_count() {
        let state = test_state();
        let Reply::Status { session_count, .. } = dispatch(&state, SessionId::new(0), Request::Status).unwrap()
        else {
            panic!("expected Status reply");
        };
        assert_eq!(session_count, 0);

        new_session(&state);
        let Reply::Status { session_count, .. } = dispatch(&state, SessionId::new(0), Request::Status).unwrap()
        else {
            panic!("expected Status reply");
        };
        assert_eq!(session_count, 1);
    }

    #[test]
    fn session_expiry_cascades_close_and_release() {
        // spec.md S7: session expiry cascades.
        let state = test_state();
        let owner = new_session(&state);
        let waiter_session = new_session(&state);
        let lock_flags = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::LOCK | OpenFlags::CREATE;

        let Reply::Open { handle: owner_handle, .. } = dispatch(
            &state,
            owner,
            Request::Open { path: "/l".to_owned(), flags: lock_flags, event_mask: 0, initial_attrs: vec![] },
        )
        .unwrap() else {
            panic!("expected Open reply");
        };
        let Reply::Open { handle: waiter_handle, .. } = dispatch(
            &state,
            waiter_session,
            Request::Open { path: "/l".to_owned(), flags: lock_flags, event_mask: 0, initial_attrs: vec![] },
        )
        .unwrap() else {
            panic!("expected Open reply");
        };

        let Reply::Lock { generation: generation_before_expiry, .. } = dispatch(
            &state,
            owner,
            Request::Lock { handle: owner_handle, mode: LockMode::Exclusive, try_lock: true },
        )
        .unwrap() else {
            panic!("expected Lock reply");
        };
        let generation_before_expiry = generation_before_expiry.unwrap();
        let Reply::Lock { status, .. } = dispatch(
            &state,
            waiter_session,
            Request::Lock { handle: waiter_handle, mode: LockMode::Exclusive, try_lock: false },
        )
        .unwrap() else {
            panic!("expected Lock reply");
        };
        assert_eq!(status, 2, "waiter must be pending behind the exclusive holder");

        state.sessions.destroy_session(owner).unwrap();
        assert!(
            !state.sessions.session_exists(owner),
            "the server's TCP layer rejects further requests on an expired session with \
             ExpiredSession before they ever reach dispatch (see tcp.rs::run_with_group_lock)"
        );

        // The expiry cascade already released the owner's lock and granted
        // it to the waiter (hyperspace_session::destroy::destroy_handle ->
        // grant_pending_in_txn), so re-issuing Lock for waiter_handle would
        // just observe Busy against its own hold. Read the node record
        // directly instead.
        let mut txn = state.store.begin().unwrap();
        let record = hyperspace_namespace::node::get_node(&mut txn, &NodePath::parse("/l").unwrap())
            .unwrap()
            .expect("node still exists");
        txn.commit().unwrap();
        assert_eq!(record.lock_mode, Some(LockMode::Exclusive));
        assert!(record.lock_holders.contains(&waiter_handle));
        assert!(record.lock_generation > generation_before_expiry);
    }
}
