//! Deferred sync runner.
//!
//! A sync requested while offline is persisted as a tag in the
//! [`SyncRegistry`]. The runner drains whenever connectivity comes back and a
//! tag is registered, and clears the tags once a drain delivers everything.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::connectivity::ConnectivityObserver;
use super::engine::{DrainResult, SyncEngine};
use crate::queue::{QueueError, SyncRegistry};

pub struct BackgroundSync {
    engine: Arc<SyncEngine>,
    registry: Arc<dyn SyncRegistry>,
}

impl BackgroundSync {
    pub fn new(engine: Arc<SyncEngine>, registry: Arc<dyn SyncRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Handle one "connectivity restored" signal.
    ///
    /// Returns `None` when no sync was registered. Tags stay registered until
    /// a drain finishes with zero failures.
    pub async fn fire(&self) -> Result<Option<DrainResult>, QueueError> {
        let tags = self.registry.registered().await?;
        if tags.is_empty() {
            debug!("No deferred sync registered");
            return Ok(None);
        }

        info!(tags = ?tags, "Running deferred sync");
        let result = self.engine.drain().await?;

        if result.is_complete() {
            for tag in &tags {
                self.registry.unregister(tag).await?;
            }
            info!(succeeded = result.succeeded, "Deferred sync complete");
        } else {
            warn!(
                failed = result.failed,
                "Deferred sync incomplete, will retry on next reconnect"
            );
        }

        Ok(Some(result))
    }

    /// Fire now if online, then on every offline to online transition, until
    /// `shutdown` resolves or the connectivity source goes away.
    pub async fn run<F>(&self, connectivity: &dyn ConnectivityObserver, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut rx = connectivity.subscribe();
        tokio::pin!(shutdown);

        let mut online = *rx.borrow_and_update();
        if online {
            self.fire_logged().await;
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Background sync stopped");
                    return;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        warn!("Connectivity source closed, stopping background sync");
                        return;
                    }
                    let now_online = *rx.borrow_and_update();
                    if now_online && !online {
                        self.fire_logged().await;
                    }
                    online = now_online;
                }
            }
        }
    }

    async fn fire_logged(&self) {
        if let Err(e) = self.fire().await {
            error!("Deferred sync failed: {}", e);
        }
    }
}
