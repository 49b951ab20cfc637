//! Local durable queue of captured recordings.
//!
//! The queue exclusively owns every `QueueEntry`. Capture sessions append,
//! the sync engine reads pending entries and asks for the status flip.
//! Nothing else writes.
//!
//! ```text
//! CaptureSession::stop ──append──▶ QueueStore ◀──list_pending / mark_uploaded── SyncEngine
//!                                      │
//!                                 koeno.db (SQLite)
//! ```

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{EntryId, NewEntry, QueueEntry};

pub use sqlite::{QueueSummary, SqliteQueue};

/// Errors that can occur with the local queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue entry not found: {0}")]
    NotFound(EntryId),

    #[error("Queue entry {id} is corrupt: {reason}")]
    Corrupt { id: EntryId, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue connection lock poisoned")]
    Poisoned,

    #[error("Queue task failed: {0}")]
    Task(String),
}

/// Durable storage for queue entries.
///
/// Implementations must persist an appended entry before returning its id,
/// and must treat one entry as the unit of consistency.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new entry with status `pending` and return its id
    async fn append(&self, entry: NewEntry) -> Result<EntryId, QueueError>;

    /// All entries still waiting for upload, in no guaranteed order
    async fn list_pending(&self) -> Result<Vec<QueueEntry>, QueueError>;

    /// Flip an entry to `uploaded`. A second call for the same id is a no-op.
    async fn mark_uploaded(&self, id: EntryId) -> Result<(), QueueError>;

    /// Read one whole entry
    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, QueueError>;
}

/// Persisted interest in a deferred sync.
///
/// A registered tag survives restarts and is cleared once a background drain
/// has delivered everything.
#[async_trait]
pub trait SyncRegistry: Send + Sync {
    async fn register(&self, tag: &str) -> Result<(), QueueError>;

    async fn registered(&self) -> Result<Vec<String>, QueueError>;

    async fn unregister(&self, tag: &str) -> Result<(), QueueError>;
}
