//! The Hyperspace coordination service daemon.
//!
//! Wires the persisted store, the in-process event bus, and the session
//! manager together and drives three concurrent loops: the TCP request
//! server, the UDP keepalive exchange, and the once-a-second lease-expiry
//! tick (`spec.md` §5, "Server loop").

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod dispatch;
pub mod error;
pub mod keepalive;
pub mod prelude;
pub mod state;
pub mod tcp;

use std::sync::Arc;

use chrono::Utc;
use hyperspace_config::Config;
use hyperspace_core::NodePath;
use hyperspace_events::EventDispatcher;
use hyperspace_namespace::NodeRecord;
use hyperspace_session::SessionManager;
use hyperspace_storage::Store;
use tracing::info;

pub use error::{ServerError, ServerResult};
pub use state::ServerState;

fn ensure_root_node(store: &Store) -> ServerResult<()> {
    hyperspace_storage::with_retry(|| {
        let mut txn = store.begin()?;
        if hyperspace_namespace::node::get_node(&mut txn, &NodePath::root())?.is_none() {
            hyperspace_namespace::node::put_node(&mut txn, &NodePath::root(), &NodeRecord::new(false, Utc::now()))?;
        }
        txn.commit()?;
        Ok(())
    })?;
    Ok(())
}

/// Open the store, recover any sessions left over from a prior crash,
/// and run the server until the process receives a shutdown signal.
///
/// # Errors
///
/// Returns a [`ServerError`] if the store cannot be opened or a listener
/// cannot be bound.
pub async fn run(config: Config) -> ServerResult<()> {
    let store = Arc::new(Store::open(&config.base_dir)?);
    ensure_root_node(&store)?;

    let dispatcher = EventDispatcher::new();
    let sessions = Arc::new(SessionManager::new(store.clone(), dispatcher.clone(), config.lease_interval()));

    let recovered = sessions.recover_on_startup()?;
    let generation = store.bump_generation()?;
    info!(recovered, generation, "startup recovery complete");

    let _listener_handle = sessions.spawn_event_listener(dispatcher.subscribe());

    let state = ServerState::new(store, dispatcher, sessions, Arc::new(config.clone()));

    let tcp_addr = format!("{}:{}", config.hyperspace.master.host, config.hyperspace.master.port)
        .parse()
        .map_err(|_| {
            ServerError::Config(hyperspace_config::ConfigError::ValidationError {
                field: "Hyperspace.Master".to_owned(),
                message: "host/port did not form a valid socket address".to_owned(),
            })
        })?;

    let tcp_task = tokio::spawn(tcp::serve(tcp_addr, state.clone()));
    let keepalive_task = tokio::spawn(keepalive::serve(tcp_addr, state.clone()));
    let tick_task = tokio::spawn(keepalive::run_tick_loop(state));

    tokio::select! {
        result = tcp_task => { result.expect("tcp server task panicked")?; }
        result = keepalive_task => { result.expect("keepalive server task panicked")?; }
        _ = tick_task => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
