//! Drain pending recordings to the backend.
//!
//! One drain takes a snapshot of the pending entries, uploads them all
//! concurrently, and marks each acknowledged one uploaded. A failed upload
//! leaves its entry pending for the next drain; nothing is ever given up on.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::adapters::{DeliveryError, TransferUnit, Uploader};
use crate::domain::{report, OperatorStatus, QueueEntry, StatusSender};
use crate::queue::{QueueError, QueueStore};

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl DrainResult {
    /// Nothing was pending
    pub fn is_noop(&self) -> bool {
        self.attempted == 0
    }

    /// Every attempted entry was delivered
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Delivers queued recordings through an uploader
pub struct SyncEngine {
    queue: Arc<dyn QueueStore>,
    uploader: Arc<dyn Uploader>,
}

impl SyncEngine {
    pub fn new(queue: Arc<dyn QueueStore>, uploader: Arc<dyn Uploader>) -> Self {
        Self { queue, uploader }
    }

    /// Drain without an observer (background use)
    pub async fn drain(&self) -> Result<DrainResult, QueueError> {
        self.drain_with_status(None).await
    }

    /// Drain, reporting progress to the operator.
    ///
    /// Only a failure to read the pending snapshot is returned as an error.
    /// Per-entry delivery failures are logged and counted.
    #[instrument(skip_all, fields(uploader = %self.uploader.name()))]
    pub async fn drain_with_status(
        &self,
        status: Option<&StatusSender>,
    ) -> Result<DrainResult, QueueError> {
        report(status, OperatorStatus::CheckingSync);

        let pending = self.queue.list_pending().await?;
        if pending.is_empty() {
            info!("Nothing to sync");
            report(status, OperatorStatus::NothingToSync);
            return Ok(DrainResult::default());
        }

        let mut result = DrainResult {
            attempted: pending.len(),
            ..Default::default()
        };
        info!(count = result.attempted, "Uploading pending recordings");
        report(
            status,
            OperatorStatus::Uploading {
                count: result.attempted,
            },
        );

        let mut uploads = JoinSet::new();
        for entry in pending {
            uploads.spawn(deliver(
                Arc::clone(&self.queue),
                Arc::clone(&self.uploader),
                entry,
            ));
        }

        while let Some(joined) = uploads.join_next().await {
            match joined {
                Ok(true) => result.succeeded += 1,
                Ok(false) => result.failed += 1,
                Err(e) => {
                    error!("Upload task failed: {}", e);
                    result.failed += 1;
                }
            }
        }

        if result.is_complete() {
            info!(succeeded = result.succeeded, "Sync complete");
            report(
                status,
                OperatorStatus::Uploaded {
                    succeeded: result.succeeded,
                },
            );
        } else {
            warn!(
                succeeded = result.succeeded,
                failed = result.failed,
                "Sync incomplete, failed entries stay pending"
            );
            report(
                status,
                OperatorStatus::UploadFailed {
                    failed: result.failed,
                },
            );
        }

        Ok(result)
    }
}

/// Deliver one entry and mark it uploaded. Returns whether it was delivered.
async fn deliver(
    queue: Arc<dyn QueueStore>,
    uploader: Arc<dyn Uploader>,
    entry: QueueEntry,
) -> bool {
    let id = entry.id;

    if entry.owner_id.trim().is_empty() {
        warn!(id, "Upload skipped: {}", DeliveryError::SessionExpired);
        return false;
    }

    let unit = TransferUnit::from(entry);
    if let Err(e) = uploader.upload(&unit).await {
        warn!(id, "Upload failed, will retry: {}", e);
        return false;
    }

    match queue.mark_uploaded(id).await {
        Ok(()) => {
            info!(id, "Upload succeeded");
            true
        }
        Err(e) => {
            // Delivered but still pending locally; the next drain sends it again
            error!(id, "Upload acknowledged but could not be recorded: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use chrono::Utc;

    use async_trait::async_trait;

    use crate::domain::{EntryId, NewEntry, UploadStatus};
    use crate::queue::SqliteQueue;
    use crate::test_support::{FlakyStore, ScriptedUploader};

    /// Uploader that captures a new recording while it uploads
    struct CapturingWhileUploading {
        queue: Arc<SqliteQueue>,
        appended: std::sync::Mutex<Vec<EntryId>>,
    }

    #[async_trait]
    impl Uploader for CapturingWhileUploading {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn upload(&self, _unit: &TransferUnit) -> Result<(), DeliveryError> {
            let id = self
                .queue
                .append(NewEntry::new("cg-01", b"late".to_vec(), "", Utc::now()))
                .await
                .unwrap();
            self.appended.lock().unwrap().push(id);
            Ok(())
        }
    }

    async fn append(queue: &SqliteQueue, owner: &str, payload: &[u8]) -> i64 {
        queue
            .append(NewEntry::new(owner, payload.to_vec(), "", Utc::now()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_then_retry() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(ScriptedUploader::new());
        let engine = SyncEngine::new(queue.clone(), uploader.clone());

        let a = append(&queue, "cg-01", b"a").await;
        let b = append(&queue, "cg-01", b"b").await;
        let c = append(&queue, "cg-02", b"c").await;
        uploader.fail_entry(b);

        let first = engine.drain().await.unwrap();
        assert_eq!(
            first,
            DrainResult {
                attempted: 3,
                succeeded: 2,
                failed: 1
            }
        );
        assert_eq!(queue.get(a).await.unwrap().unwrap().status, UploadStatus::Uploaded);
        assert_eq!(queue.get(b).await.unwrap().unwrap().status, UploadStatus::Pending);
        assert_eq!(queue.get(c).await.unwrap().unwrap().status, UploadStatus::Uploaded);

        uploader.heal_entry(b);
        let second = engine.drain().await.unwrap();
        assert_eq!(
            second,
            DrainResult {
                attempted: 1,
                succeeded: 1,
                failed: 0
            }
        );
        assert!(queue.list_pending().await.unwrap().is_empty());

        // b was attempted twice, the others once
        assert_eq!(uploader.calls(), vec![a, b, b, c]);
    }

    #[tokio::test]
    async fn test_entry_appended_during_drain_waits_for_next_drain() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(CapturingWhileUploading {
            queue: queue.clone(),
            appended: std::sync::Mutex::new(Vec::new()),
        });
        let engine = SyncEngine::new(queue.clone(), uploader.clone());

        let first_id = append(&queue, "cg-01", b"first").await;

        let first = engine.drain().await.unwrap();
        assert_eq!(
            first,
            DrainResult {
                attempted: 1,
                succeeded: 1,
                failed: 0
            }
        );
        assert_eq!(queue.get(first_id).await.unwrap().unwrap().status, UploadStatus::Uploaded);

        let late = uploader.appended.lock().unwrap()[0];
        let pending = queue.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late);

        // The next drain picks it up
        let second = engine.drain().await.unwrap();
        assert_eq!(second.attempted, 1);
        assert_eq!(second.succeeded, 1);
        assert_eq!(queue.get(late).await.unwrap().unwrap().status, UploadStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_undelivered_entries_are_retried_every_drain() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(ScriptedUploader::new());
        let engine = SyncEngine::new(queue.clone(), uploader.clone());

        let id = append(&queue, "cg-01", b"a").await;
        uploader.set_offline(true);

        for _ in 0..3 {
            let result = engine.drain().await.unwrap();
            assert_eq!(result.failed, 1);
            assert!(!result.is_complete());
        }

        assert_eq!(uploader.calls(), vec![id, id, id]);
        assert_eq!(queue.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_to_do() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(ScriptedUploader::new());
        let engine = SyncEngine::new(queue, uploader.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = engine.drain_with_status(Some(&tx)).await.unwrap();
        assert!(result.is_noop());
        assert!(result.is_complete());
        assert!(uploader.calls().is_empty());

        assert_eq!(rx.recv().await, Some(OperatorStatus::CheckingSync));
        assert_eq!(rx.recv().await, Some(OperatorStatus::NothingToSync));
    }

    #[tokio::test]
    async fn test_progress_messages() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(ScriptedUploader::new());
        let engine = SyncEngine::new(queue.clone(), uploader.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        append(&queue, "cg-01", b"a").await;
        let failing = append(&queue, "cg-01", b"b").await;
        uploader.fail_entry(failing);

        engine.drain_with_status(Some(&tx)).await.unwrap();
        drop(tx);

        let mut messages = Vec::new();
        while let Some(status) = rx.recv().await {
            messages.push(status);
        }
        assert_eq!(
            messages,
            vec![
                OperatorStatus::CheckingSync,
                OperatorStatus::Uploading { count: 2 },
                OperatorStatus::UploadFailed { failed: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_transfer_unit_fields() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(ScriptedUploader::new());
        let engine = SyncEngine::new(queue.clone(), uploader.clone());

        let created_at = Utc::now();
        queue
            .append(NewEntry::new("cg-05", b"abc".to_vec(), "fell asleep early", created_at))
            .await
            .unwrap();

        engine.drain().await.unwrap();

        let delivered = uploader.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].owner_id, "cg-05");
        assert_eq!(delivered[0].note, "fell asleep early");
        assert_eq!(delivered[0].payload, b"abc".to_vec());
        assert_eq!(
            delivered[0].created_at_iso,
            crate::domain::format_wire_timestamp(&created_at)
        );
    }

    #[tokio::test]
    async fn test_entry_without_owner_is_not_sent() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        let uploader = Arc::new(ScriptedUploader::new());
        let engine = SyncEngine::new(queue.clone(), uploader.clone());

        append(&queue, "", b"orphan").await;
        let result = engine.drain().await.unwrap();

        assert_eq!(result.failed, 1);
        assert!(uploader.calls().is_empty());
        assert_eq!(queue.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_an_error() {
        let store = Arc::new(FlakyStore::new());
        store.fail_list.store(true, Ordering::SeqCst);
        let engine = SyncEngine::new(store, Arc::new(ScriptedUploader::new()));

        assert!(engine.drain().await.is_err());
    }
}
