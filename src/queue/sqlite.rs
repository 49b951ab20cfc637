//! SQLite-backed queue store.
//!
//! One row per recording in `local_recordings`. Every operation runs as a
//! single statement or transaction on the blocking pool, so a crash leaves
//! either the whole row or nothing. Triggers reject payload mutation and
//! status reversal even for writers that bypass this module.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{QueueError, QueueStore, SyncRegistry};
use crate::domain::{EntryId, EntryInfo, NewEntry, QueueEntry, UploadStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS local_recordings (
    local_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    caregiver_id    TEXT NOT NULL,
    audio_blob      BLOB NOT NULL,
    payload_sha256  TEXT NOT NULL,
    memo_text       TEXT NOT NULL DEFAULT '',
    upload_status   TEXT NOT NULL DEFAULT 'pending'
                    CHECK (upload_status IN ('pending', 'uploaded')),
    created_at      TEXT NOT NULL,
    uploaded_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_local_recordings_status
    ON local_recordings (upload_status);
CREATE INDEX IF NOT EXISTS idx_local_recordings_caregiver
    ON local_recordings (caregiver_id);
CREATE INDEX IF NOT EXISTS idx_local_recordings_created
    ON local_recordings (created_at);

CREATE TRIGGER IF NOT EXISTS local_recordings_immutable
BEFORE UPDATE OF local_id, caregiver_id, audio_blob, payload_sha256, created_at
ON local_recordings
BEGIN
    SELECT RAISE(ABORT, 'recorded entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS local_recordings_status_forward
BEFORE UPDATE OF upload_status ON local_recordings
WHEN OLD.upload_status = 'uploaded' AND NEW.upload_status <> 'uploaded'
BEGIN
    SELECT RAISE(ABORT, 'upload status cannot be reverted');
END;

CREATE TABLE IF NOT EXISTS sync_registrations (
    tag            TEXT PRIMARY KEY,
    registered_at  TEXT NOT NULL
);
"#;

const ENTRY_COLUMNS: &str = "local_id, caregiver_id, audio_blob, payload_sha256, memo_text, \
                             upload_status, created_at, uploaded_at";

/// Queue counts for status displays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub pending: usize,
    pub uploaded: usize,
    /// Capture time of the oldest entry still waiting
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl QueueSummary {
    /// Total entries ever recorded on this device
    pub fn total(&self) -> usize {
        self.pending + self.uploaded
    }
}

/// Local queue stored in a SQLite database
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteQueue {
    /// Open (or create) the queue database at `path`
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Queue that lives only as long as this value
    pub fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Open the queue in the default location (~/.koeno/koeno.db)
    pub async fn open_default() -> anyhow::Result<Self> {
        let path = crate::config::paths::queue_db()?;
        let queue = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        Ok(queue)
    }

    /// Database file, if this queue is file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| QueueError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| QueueError::Task(e.to_string()))?
    }

    /// Counts by status
    pub async fn summary(&self) -> Result<QueueSummary, QueueError> {
        self.with_conn(|conn| {
            let mut summary = QueueSummary::default();

            let mut stmt = conn.prepare(
                "SELECT upload_status, COUNT(*) FROM local_recordings GROUP BY upload_status",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                match status.parse::<UploadStatus>() {
                    Ok(UploadStatus::Pending) => summary.pending = count as usize,
                    Ok(UploadStatus::Uploaded) => summary.uploaded = count as usize,
                    Err(e) => tracing::warn!("Ignoring rows with {}", e),
                }
            }

            let oldest: Option<String> = conn.query_row(
                "SELECT MIN(created_at) FROM local_recordings WHERE upload_status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            summary.oldest_pending = match oldest {
                Some(ts) => Some(parse_timestamp(0, &ts)?),
                None => None,
            };

            Ok(summary)
        })
        .await
    }

    /// Most recent entries first, without payloads
    pub async fn recent(
        &self,
        status: Option<UploadStatus>,
        limit: usize,
    ) -> Result<Vec<EntryInfo>, QueueError> {
        self.with_conn(move |conn| {
            let sql = "SELECT local_id, caregiver_id, length(audio_blob), memo_text, \
                       upload_status, created_at, uploaded_at \
                       FROM local_recordings \
                       WHERE (?1 IS NULL OR upload_status = ?1) \
                       ORDER BY local_id DESC LIMIT ?2";
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                params![status.map(|s| s.as_str()), limit as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )?;

            let mut infos = Vec::new();
            for row in rows {
                let (id, owner_id, len, note, status, created_at, uploaded_at) = row?;
                infos.push(EntryInfo {
                    id,
                    owner_id,
                    note,
                    payload_len: len.max(0) as usize,
                    created_at: parse_timestamp(id, &created_at)?,
                    status: parse_status(id, &status)?,
                    uploaded_at: uploaded_at
                        .as_deref()
                        .map(|ts| parse_timestamp(id, ts))
                        .transpose()?,
                });
            }
            Ok(infos)
        })
        .await
    }
}

#[async_trait]
impl QueueStore for SqliteQueue {
    async fn append(&self, entry: NewEntry) -> Result<EntryId, QueueError> {
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO local_recordings \
                     (caregiver_id, audio_blob, payload_sha256, memo_text, upload_status, created_at) \
                     VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                    params![
                        entry.owner_id,
                        entry.payload,
                        payload_digest(&entry.payload),
                        entry.note,
                        format_timestamp(&entry.created_at),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        tracing::debug!(id, "Recording appended to local queue");
        Ok(id)
    }

    async fn list_pending(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM local_recordings WHERE upload_status = 'pending' ORDER BY local_id",
                ENTRY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], RawEntry::from_row)?;

            let mut pending = Vec::new();
            for row in rows {
                match row?.into_entry() {
                    Ok(entry) => pending.push(entry),
                    // Leave it in place; a bad row must not hide the good ones
                    Err(e) => tracing::error!("Skipping unreadable queue entry: {}", e),
                }
            }
            Ok(pending)
        })
        .await
    }

    async fn mark_uploaded(&self, id: EntryId) -> Result<(), QueueError> {
        let changed = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let current: Option<String> = tx
                    .query_row(
                        "SELECT upload_status FROM local_recordings WHERE local_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let status = match current {
                    Some(s) => parse_status(id, &s)?,
                    None => return Err(QueueError::NotFound(id)),
                };
                if status == UploadStatus::Uploaded {
                    return Ok(false);
                }

                tx.execute(
                    "UPDATE local_recordings SET upload_status = 'uploaded', uploaded_at = ?2 \
                     WHERE local_id = ?1",
                    params![id, format_timestamp(&Utc::now())],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if !changed {
            tracing::debug!(id, "Entry already uploaded");
        }
        Ok(())
    }

    async fn get(&self, id: EntryId) -> Result<Option<QueueEntry>, QueueError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM local_recordings WHERE local_id = ?1",
                ENTRY_COLUMNS
            );
            let raw = conn
                .query_row(&sql, params![id], RawEntry::from_row)
                .optional()?;
            raw.map(RawEntry::into_entry).transpose()
        })
        .await
    }
}

#[async_trait]
impl SyncRegistry for SqliteQueue {
    async fn register(&self, tag: &str) -> Result<(), QueueError> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_registrations (tag, registered_at) VALUES (?1, ?2) \
                 ON CONFLICT(tag) DO NOTHING",
                params![tag, format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    async fn registered(&self) -> Result<Vec<String>, QueueError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT tag FROM sync_registrations ORDER BY registered_at, tag")?;
            let tags = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
        .await
    }

    async fn unregister(&self, tag: &str) -> Result<(), QueueError> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM sync_registrations WHERE tag = ?1", params![tag])?;
            Ok(())
        })
        .await
    }
}

/// Row as stored, before validation
struct RawEntry {
    id: EntryId,
    owner_id: String,
    payload: Vec<u8>,
    digest: String,
    note: String,
    status: String,
    created_at: String,
    uploaded_at: Option<String>,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            payload: row.get(2)?,
            digest: row.get(3)?,
            note: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
            uploaded_at: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<QueueEntry, QueueError> {
        if payload_digest(&self.payload) != self.digest {
            return Err(QueueError::Corrupt {
                id: self.id,
                reason: "payload digest mismatch".to_string(),
            });
        }

        Ok(QueueEntry {
            id: self.id,
            status: parse_status(self.id, &self.status)?,
            created_at: parse_timestamp(self.id, &self.created_at)?,
            uploaded_at: self
                .uploaded_at
                .as_deref()
                .map(|ts| parse_timestamp(self.id, ts))
                .transpose()?,
            owner_id: self.owner_id,
            payload: self.payload,
            note: self.note,
        })
    }
}

/// SHA256 of the payload, hex encoded
fn payload_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

// Nanosecond precision so a stored timestamp reads back identical
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(id: EntryId, raw: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QueueError::Corrupt {
            id,
            reason: format!("invalid timestamp {:?}: {}", raw, e),
        })
}

fn parse_status(id: EntryId, raw: &str) -> Result<UploadStatus, QueueError> {
    raw.parse()
        .map_err(|reason| QueueError::Corrupt { id, reason })
}
