//! Offline Pipeline Integration Tests
//!
//! A whole shift on disk: sign in, capture, lock while offline, restart,
//! reconnect, and let the background runner deliver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use koeno::adapters::{DeliveryError, TransferUnit, Uploader};
use koeno::auth::{self, Role, RoleSource, SessionContext, SessionFile};
use koeno::capture::{CaptureError, CaptureSession, FileInput};
use koeno::domain::UploadStatus;
use koeno::lock::{LockController, SyncOutcome};
use koeno::queue::{QueueStore, SqliteQueue, SyncRegistry};
use koeno::sync::{BackgroundSync, ManualConnectivity, SyncEngine};

struct StaffOnly;

#[async_trait]
impl RoleSource for StaffOnly {
    async fn role_for(&self, _caregiver_id: &str) -> Role {
        Role::Staff
    }
}

/// Backend stand-in that is either up or down
#[derive(Default)]
struct SwitchedBackend {
    down: AtomicBool,
    received: Mutex<Vec<TransferUnit>>,
}

impl SwitchedBackend {
    fn down() -> Self {
        let backend = Self::default();
        backend.down.store(true, Ordering::SeqCst);
        backend
    }

    fn received(&self) -> Vec<TransferUnit> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for SwitchedBackend {
    fn name(&self) -> &str {
        "switched"
    }

    async fn upload(&self, unit: &TransferUnit) -> Result<(), DeliveryError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unreachable("backend down".to_string()));
        }
        self.received.lock().unwrap().push(unit.clone());
        Ok(())
    }
}

async fn write_audio(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    tokio::fs::write(&path, bytes).await.unwrap();
    path
}

async fn record(
    queue: &Arc<SqliteQueue>,
    session: &SessionContext,
    file: &std::path::Path,
    note: &str,
) -> Result<i64, CaptureError> {
    let mut capture = CaptureSession::new(
        Arc::new(FileInput::new(file)),
        queue.clone(),
        session.clone(),
    );
    capture.start().await?;
    capture.pause();
    capture.resume();
    Ok(capture.stop(note).await?.id)
}

#[tokio::test]
async fn test_offline_shift_delivered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("koeno.db");
    let session_file = SessionFile::new(dir.path().join("session.json"));

    // Shift: sign in and capture two memos while the backend is down
    let queue = Arc::new(SqliteQueue::open(&db_path).unwrap());
    let session = SessionContext::new();
    let operator = auth::login(&session, &StaffOnly, "cg-11").await.unwrap();
    session_file.save(&operator).await.unwrap();

    let first = write_audio(&dir, "a.webm", b"first memo").await;
    let second = write_audio(&dir, "b.webm", b"second memo").await;
    let a = record(&queue, &session, &first, "room 3").await.unwrap();
    let b = record(&queue, &session, &second, "room 4").await.unwrap();

    let backend = Arc::new(SwitchedBackend::down());
    let engine = Arc::new(SyncEngine::new(queue.clone(), backend.clone()));
    let controller = LockController::new(
        session.clone(),
        engine,
        queue.clone(),
        Arc::new(ManualConnectivity::new(false)),
    );

    let outcome = controller.lock(None).await;
    session_file.clear().await.unwrap();

    assert!(matches!(outcome.sync, SyncOutcome::Deferred { .. }));
    assert!(!session.is_signed_in());
    assert!(session_file.load().await.unwrap().is_none());
    assert!(backend.received().is_empty());
    drop(controller);
    drop(queue);

    // Restart: everything is still on disk
    let queue = Arc::new(SqliteQueue::open(&db_path).unwrap());
    assert_eq!(queue.list_pending().await.unwrap().len(), 2);
    assert_eq!(queue.registered().await.unwrap().len(), 1);

    backend.down.store(false, Ordering::SeqCst);
    let engine = Arc::new(SyncEngine::new(queue.clone(), backend.clone()));
    let runner = Arc::new(BackgroundSync::new(engine, queue.clone()));
    let connectivity = Arc::new(ManualConnectivity::new(false));
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn({
        let runner = runner.clone();
        let connectivity = connectivity.clone();
        async move {
            runner
                .run(connectivity.as_ref(), async {
                    let _ = stop_rx.await;
                })
                .await;
        }
    });

    connectivity.set_online(true);
    for _ in 0..200 {
        if queue.registered().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(queue.list_pending().await.unwrap().is_empty());
    assert!(queue.registered().await.unwrap().is_empty());
    for id in [a, b] {
        let entry = queue.get(id).await.unwrap().unwrap();
        assert_eq!(entry.status, UploadStatus::Uploaded);
        assert!(entry.uploaded_at.is_some());
    }

    let mut received = backend.received();
    received.sort_by_key(|u| u.entry_id);
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].owner_id, "cg-11");
    assert_eq!(received[0].note, "room 3");
    assert_eq!(received[0].payload, b"first memo".to_vec());
    assert_eq!(received[1].note, "room 4");
    assert_eq!(received[1].payload, b"second memo".to_vec());
}

#[tokio::test]
async fn test_empty_capture_file_is_still_queued() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(SqliteQueue::open(&dir.path().join("koeno.db")).unwrap());
    let session = SessionContext::new();
    auth::login(&session, &StaffOnly, "cg-12").await.unwrap();

    let empty = write_audio(&dir, "empty.webm", b"").await;
    let id = record(&queue, &session, &empty, "").await.unwrap();

    let pending = queue.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert!(pending[0].payload.is_empty());
    assert_eq!(pending[0].status, UploadStatus::Pending);
}

#[tokio::test]
async fn test_missing_file_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(SqliteQueue::open(&dir.path().join("koeno.db")).unwrap());
    let session = SessionContext::new();
    auth::login(&session, &StaffOnly, "cg-13").await.unwrap();

    let err = record(&queue, &session, &dir.path().join("nope.webm"), "")
        .await
        .unwrap_err();

    assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    assert!(queue.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_capture_after_lock_requires_sign_in() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(SqliteQueue::open(&dir.path().join("koeno.db")).unwrap());
    let session = SessionContext::new();
    auth::login(&session, &StaffOnly, "cg-14").await.unwrap();

    let engine = Arc::new(SyncEngine::new(
        queue.clone(),
        Arc::new(SwitchedBackend::default()),
    ));
    let controller = LockController::new(
        session.clone(),
        engine,
        queue.clone(),
        Arc::new(ManualConnectivity::new(true)),
    );
    controller.lock(None).await;

    let file = write_audio(&dir, "late.webm", b"late").await;
    let err = record(&queue, &session, &file, "").await.unwrap_err();
    assert!(matches!(err, CaptureError::SessionExpired));
}
