//! Adapter interfaces for the care-records backend.
//!
//! Adapters provide a unified interface for the HTTP calls the capture core
//! depends on: recording upload, role lookup at sign-in, and reachability.

pub mod probe;
pub mod roles;
pub mod upload;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{EntryId, QueueEntry};

pub use probe::{HttpProbe, Reachability};
pub use roles::HttpRoleSource;
pub use upload::HttpUploader;

/// Why one recording could not be delivered. Always retryable.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Server rejected upload with status {status}")]
    Rejected { status: u16 },

    #[error("Recording has no caregiver id; sign in again")]
    SessionExpired,
}

/// What is sent to the backend for one queued recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUnit {
    /// Local id, for logging only (never sent)
    pub entry_id: EntryId,
    pub owner_id: String,
    pub note: String,
    pub payload: Vec<u8>,
    /// Capture time as an absolute UTC string
    pub created_at_iso: String,
}

impl From<QueueEntry> for TransferUnit {
    fn from(entry: QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            created_at_iso: entry.created_at_iso(),
            owner_id: entry.owner_id,
            note: entry.note,
            payload: entry.payload,
        }
    }
}

/// Trait for recording delivery backends
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Human-readable uploader name
    fn name(&self) -> &str;

    /// Deliver one recording. `Ok` means the backend acknowledged it.
    async fn upload(&self, unit: &TransferUnit) -> Result<(), DeliveryError>;
}
