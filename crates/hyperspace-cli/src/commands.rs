//! One function per subcommand in [`crate::Commands`], each opening
//! whatever handle the underlying wire operation needs and closing it
//! again before returning.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use hyperspace_client::Client;
use hyperspace_core::{EventMask, HandleId, LockMode, OpenFlags};

/// `clap`-facing mirror of [`LockMode`]; the wire type has no
/// [`ValueEnum`] impl of its own since `hyperspace-core` does not depend
/// on `clap`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LockArg {
    /// Any number of handles may hold the lock concurrently.
    Shared,
    /// At most one handle may hold the lock.
    Exclusive,
}

impl From<LockArg> for LockMode {
    fn from(value: LockArg) -> Self {
        match value {
            LockArg::Shared => Self::Shared,
            LockArg::Exclusive => Self::Exclusive,
        }
    }
}

fn no_op_callback() -> Arc<dyn hyperspace_client::HandleCallback> {
    Arc::new(|_event: &hyperspace_core::Event| {})
}

/// Open `path`, run `body` with the resulting handle, then close it
/// regardless of whether `body` succeeded.
async fn with_handle<F, Fut>(client: &Client, path: &str, flags: u32, body: F) -> Result<()>
where
    F: FnOnce(HandleId) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let opened = client
        .open(path, OpenFlags(flags), EventMask::none(), Vec::new(), no_op_callback())
        .await
        .with_context(|| format!("open {path}"))?;
    let result = body(opened.handle).await;
    if let Err(error) = client.close(opened.handle).await {
        tracing::warn!(%path, %error, "failed to close handle after command");
    }
    result
}

pub async fn mkdir(client: &Client, path: &str) -> Result<()> {
    client.mkdir(path).await.with_context(|| format!("mkdir {path}"))?;
    println!("{} created {path}", "ok".green());
    Ok(())
}

pub async fn unlink(client: &Client, path: &str) -> Result<()> {
    client.unlink(path).await.with_context(|| format!("unlink {path}"))?;
    println!("{} removed {path}", "ok".green());
    Ok(())
}

pub async fn exists(client: &Client, path: &str) -> Result<()> {
    let found = client.exists(path).await.with_context(|| format!("exists {path}"))?;
    println!("{found}");
    Ok(())
}

pub async fn readdir(client: &Client, path: &str) -> Result<()> {
    with_handle(client, path, OpenFlags::READ, |handle| async move {
        let names = client.readdir(handle).await.with_context(|| format!("readdir {path}"))?;
        for name in names {
            println!("{name}");
        }
        Ok(())
    })
    .await
}

pub async fn attr_get(client: &Client, path: &str, name: &str) -> Result<()> {
    with_handle(client, path, OpenFlags::READ, |handle| async move {
        let value = client.attr_get(handle, name).await.with_context(|| format!("attr-get {path} {name}"))?;
        match std::str::from_utf8(&value) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{value:?}"),
        }
        Ok(())
    })
    .await
}

pub async fn attr_set(client: &Client, path: &str, name: &str, value: String) -> Result<()> {
    with_handle(client, path, OpenFlags::WRITE, |handle| async move {
        client
            .attr_set(handle, name, value.into_bytes())
            .await
            .with_context(|| format!("attr-set {path} {name}"))?;
        println!("{} set {name} on {path}", "ok".green());
        Ok(())
    })
    .await
}

pub async fn attr_del(client: &Client, path: &str, name: &str) -> Result<()> {
    with_handle(client, path, OpenFlags::WRITE, |handle| async move {
        client.attr_del(handle, name).await.with_context(|| format!("attr-del {path} {name}"))?;
        println!("{} deleted {name} from {path}", "ok".green());
        Ok(())
    })
    .await
}

pub async fn attr_list(client: &Client, path: &str) -> Result<()> {
    with_handle(client, path, OpenFlags::READ, |handle| async move {
        let names = client.attr_list(handle).await.with_context(|| format!("attr-list {path}"))?;
        for name in names {
            println!("{name}");
        }
        Ok(())
    })
    .await
}

pub async fn lock(client: &Client, path: &str, mode: LockMode, try_lock: bool) -> Result<()> {
    with_handle(client, path, OpenFlags::READ | OpenFlags::LOCK, |handle| async move {
        let outcome = client.lock(handle, mode, try_lock).await.with_context(|| format!("lock {path}"))?;
        match outcome {
            hyperspace_client::LockOutcome::Granted { generation } => {
                println!("{} granted, generation {generation}", "locked".green());
            }
            hyperspace_client::LockOutcome::Busy => {
                println!("{} lock is held", "busy".yellow());
            }
            hyperspace_client::LockOutcome::Pending => {
                println!("{} request enqueued, awaiting grant notification", "pending".yellow());
            }
        }
        client.release(handle).await.with_context(|| format!("release {path}"))?;
        Ok(())
    })
    .await
}

pub async fn status(client: &Client) -> Result<()> {
    let (generation, session_count) = client.status().await.context("status")?;
    println!("generation: {generation}");
    println!("sessions:   {session_count}");
    Ok(())
}
