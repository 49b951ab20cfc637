//! Queue entry types.
//!
//! A `QueueEntry` is one captured recording, either waiting for upload or
//! already delivered. Entries are written whole by a finished capture session
//! and only ever change status from `Pending` to `Uploaded`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key assigned by the local queue at persist time
pub type EntryId = i64;

/// Upload status of a queued recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Persisted locally, not yet acknowledged by the backend
    Pending,

    /// Acknowledged by the backend (terminal)
    Uploaded,
}

impl UploadStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "uploaded" => Ok(Self::Uploaded),
            other => Err(format!("unknown upload status: {}", other)),
        }
    }
}

/// A recording ready to be appended to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub owner_id: String,
    pub payload: Vec<u8>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    pub fn new(
        owner_id: impl Into<String>,
        payload: Vec<u8>,
        note: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            payload,
            note: note.into(),
            created_at,
        }
    }
}

/// One persisted recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Locally unique, never reused
    pub id: EntryId,

    /// Caregiver who captured the recording
    pub owner_id: String,

    /// Raw audio bytes (may be empty)
    pub payload: Vec<u8>,

    /// Free-text memo attached at capture time
    pub note: String,

    /// When the capture finished
    pub created_at: DateTime<Utc>,

    /// Current upload status
    pub status: UploadStatus,

    /// When the backend acknowledged the upload
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn is_pending(&self) -> bool {
        self.status == UploadStatus::Pending
    }

    /// Capture time as sent to the backend (`2024-05-01T09:30:00.000Z`)
    pub fn created_at_iso(&self) -> String {
        format_wire_timestamp(&self.created_at)
    }
}

/// Queue row without its audio payload, for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub id: EntryId,
    pub owner_id: String,
    pub note: String,
    pub payload_len: usize,
    pub created_at: DateTime<Utc>,
    pub status: UploadStatus,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Absolute UTC timestamp with millisecond precision and a `Z` suffix
pub fn format_wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
