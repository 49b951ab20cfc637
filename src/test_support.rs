//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::adapters::{DeliveryError, TransferUnit, Uploader};
use crate::auth::{Operator, Role, SessionContext};
use crate::capture::{AudioInput, AudioStream, DeviceError};
use crate::domain::{EntryId, NewEntry, QueueEntry};
use crate::queue::{QueueError, QueueStore, SqliteQueue};

pub fn signed_in(caregiver_id: &str) -> SessionContext {
    SessionContext::signed_in(Operator::new(caregiver_id, Role::Staff))
}

/// Microphone that yields fixed audio and tracks acquisition
pub struct FakeMicrophone {
    audio: Vec<u8>,
    deny: bool,
    active: Arc<AtomicUsize>,
    paused: Arc<AtomicBool>,
}

impl FakeMicrophone {
    pub fn with_audio(audio: &[u8]) -> Self {
        Self {
            audio: audio.to_vec(),
            deny: false,
            active: Arc::new(AtomicUsize::new(0)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::with_audio(b"")
        }
    }

    /// Number of streams currently holding the device
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioInput for FakeMicrophone {
    fn name(&self) -> &str {
        "fake"
    }

    async fn acquire(&self) -> Result<Box<dyn AudioStream>, DeviceError> {
        if self.deny {
            return Err(DeviceError::PermissionDenied);
        }
        if self.active.load(Ordering::SeqCst) > 0 {
            return Err(DeviceError::Busy);
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            audio: self.audio.clone(),
            active: Arc::clone(&self.active),
            paused: Arc::clone(&self.paused),
        }))
    }
}

struct FakeStream {
    audio: Vec<u8>,
    active: Arc<AtomicUsize>,
    paused: Arc<AtomicBool>,
}

#[async_trait]
impl AudioStream for FakeStream {
    fn pause(&mut self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    async fn finish(self: Box<Self>) -> Result<Vec<u8>, DeviceError> {
        let mut stream = self;
        Ok(std::mem::take(&mut stream.audio))
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Uploader whose failures are scripted per entry
#[derive(Default)]
pub struct ScriptedUploader {
    failing: Mutex<HashSet<EntryId>>,
    offline: AtomicBool,
    calls: Mutex<Vec<EntryId>>,
    delivered: Mutex<Vec<TransferUnit>>,
}

impl ScriptedUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_entry(&self, id: EntryId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn heal_entry(&self, id: EntryId) {
        self.failing.lock().unwrap().remove(&id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Entry ids attempted so far, sorted
    pub fn calls(&self) -> Vec<EntryId> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_unstable();
        calls
    }

    pub fn delivered(&self) -> Vec<TransferUnit> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for ScriptedUploader {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn upload(&self, unit: &TransferUnit) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(unit.entry_id);

        if self.offline.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unreachable("simulated offline".to_string()));
        }
        if self.failing.lock().unwrap().contains(&unit.entry_id) {
            return Err(DeliveryError::Unreachable("simulated network error".to_string()));
        }

        self.delivered.lock().unwrap().push(unit.clone());
        Ok(())
    }
}

/// SQLite queue with switchable storage faults
pub struct FlakyStore {
    inner: SqliteQueue,
    pub fail_append: AtomicBool,
    pub fail_list: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteQueue::open_in_memory().unwrap(),
            fail_append: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
        }
    }

    fn fault() -> QueueError {
        QueueError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated storage fault",
        ))
    }
}

#[async_trait]
impl QueueStore for FlakyStore {
    async fn append(&self, entry: NewEntry) -> Result<EntryId, QueueError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(Self::fault());
        }
        self.inner.append(entry).await
    }

    async fn list_pending(&self) -> Result<Vec<QueueEntry>, QueueError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::fault());
        }
        self.inner.list_pending().await
    }

    async fn mark_uploaded(&self, id: EntryId) -> Result<(), QueueError> {
        self.inner.mark_uploaded(id).await
    }

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, QueueError> {
        self.inner.get(id).await
    }
}
