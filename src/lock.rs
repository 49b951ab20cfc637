//! End-of-shift lock sequence.
//!
//! Locking runs three steps in order, each finishing before the next starts:
//!
//! 1. stop and commit the active capture, if any
//! 2. drain now when online, or register a deferred sync when offline
//! 3. sign out
//!
//! Sign-out happens whatever steps 1 and 2 produced.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::auth::{Operator, SessionContext};
use crate::capture::{CaptureError, CaptureSession};
use crate::config::DEFAULT_SYNC_TAG;
use crate::domain::{report, OperatorStatus, QueueEntry, StatusSender};
use crate::queue::SyncRegistry;
use crate::sync::{ConnectivityObserver, DrainResult, SyncEngine};

/// What happened to pending uploads during a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Online: a foreground drain ran to completion
    Drained(DrainResult),

    /// Offline: the tag was registered for the background runner
    Deferred { tag: String },

    /// Neither a drain nor a registration succeeded
    Failed { reason: String },
}

/// Everything a lock did
#[derive(Debug)]
pub struct LockOutcome {
    pub committed: Option<QueueEntry>,
    pub capture_error: Option<CaptureError>,
    pub sync: SyncOutcome,
    pub signed_out: Option<Operator>,
}

/// Sequences stop, sync and sign-out
pub struct LockController {
    session: SessionContext,
    engine: Arc<SyncEngine>,
    registry: Arc<dyn SyncRegistry>,
    connectivity: Arc<dyn ConnectivityObserver>,
    sync_tag: String,
    status: Option<StatusSender>,
}

impl LockController {
    pub fn new(
        session: SessionContext,
        engine: Arc<SyncEngine>,
        registry: Arc<dyn SyncRegistry>,
        connectivity: Arc<dyn ConnectivityObserver>,
    ) -> Self {
        Self {
            session,
            engine,
            registry,
            connectivity,
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            status: None,
        }
    }

    pub fn with_sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.sync_tag = tag.into();
        self
    }

    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = Some(status);
        self
    }

    /// Lock the shift.
    ///
    /// Never fails: capture and sync problems are recorded in the outcome and
    /// the session is signed out regardless.
    #[instrument(skip_all, fields(online = self.connectivity.is_online()))]
    pub async fn lock(&self, capture: Option<CaptureSession>) -> LockOutcome {
        let (committed, capture_error) = match capture {
            Some(capture) if capture.is_active() => match capture.stop("").await {
                Ok(entry) => (Some(entry), None),
                Err(e) => {
                    warn!("Capture could not be committed during lock: {}", e);
                    (None, Some(e))
                }
            },
            // Idle sessions hold no audio
            Some(_) | None => (None, None),
        };

        let sync = if self.connectivity.is_online() {
            self.drain_now().await
        } else {
            self.defer().await
        };

        let signed_out = self.session.logout();
        report(self.status.as_ref(), OperatorStatus::LoggedOut);
        info!(sync = ?sync, "Locked");

        LockOutcome {
            committed,
            capture_error,
            sync,
            signed_out,
        }
    }

    async fn drain_now(&self) -> SyncOutcome {
        let engine = Arc::clone(&self.engine);
        let status = self.status.clone();

        // A panicking drain must not skip sign-out
        let joined = tokio::spawn(async move { engine.drain_with_status(status.as_ref()).await }).await;

        let reason = match joined {
            Ok(Ok(result)) => return SyncOutcome::Drained(result),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        error!("Sync during lock failed: {}", reason);
        report(
            self.status.as_ref(),
            OperatorStatus::SyncError {
                reason: reason.clone(),
            },
        );
        SyncOutcome::Failed { reason }
    }

    async fn defer(&self) -> SyncOutcome {
        match self.registry.register(&self.sync_tag).await {
            Ok(()) => {
                info!(tag = %self.sync_tag, "Offline, sync deferred");
                report(self.status.as_ref(), OperatorStatus::SyncDeferred);
                SyncOutcome::Deferred {
                    tag: self.sync_tag.clone(),
                }
            }
            Err(e) => {
                error!("Could not register deferred sync: {}", e);
                report(
                    self.status.as_ref(),
                    OperatorStatus::SyncError {
                        reason: e.to_string(),
                    },
                );
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
