//! Sync commands.
//!
//! - `koeno sync` - Foreground drain of the local queue
//! - `koeno lock` - End the shift (sync or defer, then sign out)
//! - `koeno watch` - Background runner for deferred syncs

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;

use super::{open_queue, restore_session, status_printer};
use crate::adapters::{HttpProbe, HttpUploader, Reachability};
use crate::config;
use crate::lock::{LockController, SyncOutcome};
use crate::queue::{QueueStore, SyncRegistry};
use crate::sync::{BackgroundSync, ManualConnectivity, ProbeConnectivity, SyncEngine};

/// Upload everything pending now
pub async fn execute_sync() -> Result<()> {
    let cfg = config::config()?;
    let queue = open_queue().await?;
    let uploader = Arc::new(HttpUploader::new(&cfg.api)?);
    println!("📤 Syncing to {}", uploader.url());
    let engine = SyncEngine::new(queue, uploader);

    let (status_tx, printer) = status_printer();
    let result = engine.drain_with_status(Some(&status_tx)).await;
    drop(status_tx);
    let _ = printer.await;

    let result = result.context("Failed to read pending recordings")?;
    if result.is_noop() {
        println!("ℹ️  Nothing to sync");
    } else if result.is_complete() {
        println!("✅ Uploaded {} recording(s)", result.succeeded);
    } else {
        println!(
            "⚠️  Uploaded {}, {} failed and will be retried",
            result.succeeded, result.failed
        );
    }

    Ok(())
}

/// Lock the shift and forget the persisted session
pub async fn execute_lock(offline: bool) -> Result<()> {
    let cfg = config::config()?;
    let (file, context) = restore_session().await?;
    let queue = open_queue().await?;

    let online = if offline {
        false
    } else {
        HttpProbe::new(&cfg.api)?.is_reachable().await
    };

    let uploader = Arc::new(HttpUploader::new(&cfg.api)?);
    let engine = Arc::new(SyncEngine::new(queue.clone(), uploader));
    let (status_tx, printer) = status_printer();

    let controller = LockController::new(
        context,
        engine,
        queue,
        Arc::new(ManualConnectivity::new(online)),
    )
    .with_sync_tag(cfg.sync.tag.clone())
    .with_status(status_tx);

    let outcome = controller.lock(None).await;
    drop(controller);
    let _ = printer.await;

    file.clear().await?;

    match &outcome.sync {
        SyncOutcome::Drained(result) if result.is_complete() => {
            println!("✅ Synced {} recording(s)", result.succeeded)
        }
        SyncOutcome::Drained(result) => println!(
            "⚠️  {} recording(s) failed to upload and stay queued",
            result.failed
        ),
        SyncOutcome::Deferred { tag } => {
            println!("📴 Offline: sync deferred ({}). Run `koeno watch` to deliver later.", tag)
        }
        SyncOutcome::Failed { reason } => println!("❌ Sync failed: {}", reason),
    }
    match outcome.signed_out {
        Some(operator) => println!("🔒 Locked, {} signed out", operator.caregiver_id),
        None => println!("🔒 Locked (nobody was signed in)"),
    }

    Ok(())
}

/// Drain deferred syncs whenever the backend comes back, until Ctrl+C
pub async fn execute_watch() -> Result<()> {
    let cfg = config::config()?;

    // Only one background runner at a time
    let lock_path = config::paths::sync_lock()?;
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .context("Another `koeno watch` is already running")?;

    let queue = open_queue().await?;
    let uploader = Arc::new(HttpUploader::new(&cfg.api)?);
    let engine = Arc::new(SyncEngine::new(queue.clone(), uploader));

    // Entries left by an earlier run without a registration still get delivered
    let pending = queue.list_pending().await?.len();
    if pending > 0 {
        queue.register(&cfg.sync.tag).await?;
        println!("📥 {} recording(s) waiting for sync", pending);
    }

    let probe: Arc<dyn Reachability> = Arc::new(HttpProbe::new(&cfg.api)?);
    let connectivity = ProbeConnectivity::spawn(probe, cfg.sync.probe_interval());
    let runner = BackgroundSync::new(engine, queue);

    println!("👁️  Watching {}", cfg.api.base_url);
    println!("    Press Ctrl+C to stop");
    println!();

    runner
        .run(&connectivity, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    println!();
    println!("🛑 Stopped");
    FileExt::unlock(&lock_file).context("Failed to release lock file")?;

    Ok(())
}
