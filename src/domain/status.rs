//! Operator-facing status messages.
//!
//! Foreground operations push these to whoever is showing progress to the
//! caregiver. Background work never emits them; it only logs.

use std::fmt;

use tokio::sync::mpsc;

use super::entry::EntryId;

/// Channel end used to publish operator status
pub type StatusSender = mpsc::UnboundedSender<OperatorStatus>;

/// A human-readable progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorStatus {
    PreparingMicrophone,
    Recording,
    Paused,
    Saving,
    SavedLocally { id: EntryId },
    MicrophoneUnavailable { reason: String },
    SaveFailed { reason: String },
    SessionExpired,
    CheckingSync,
    NothingToSync,
    Uploading { count: usize },
    Uploaded { succeeded: usize },
    UploadFailed { failed: usize },
    SyncDeferred,
    SyncError { reason: String },
    LoggedOut,
}

impl fmt::Display for OperatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreparingMicrophone => write!(f, "preparing microphone…"),
            Self::Recording => write!(f, "recording…"),
            Self::Paused => write!(f, "paused"),
            Self::Saving => write!(f, "saving…"),
            Self::SavedLocally { id } => {
                write!(f, "saved locally (#{}), waiting for sync", id)
            }
            Self::MicrophoneUnavailable { reason } => {
                write!(f, "microphone unavailable: {}", reason)
            }
            Self::SaveFailed { reason } => {
                write!(f, "could not save the recording locally: {}", reason)
            }
            Self::SessionExpired => write!(f, "session expired, lock and sign in again"),
            Self::CheckingSync => write!(f, "checking for recordings to sync…"),
            Self::NothingToSync => write!(f, "nothing to sync"),
            Self::Uploading { count } => write!(f, "uploading {} items…", count),
            Self::Uploaded { succeeded } => write!(f, "uploaded {} items", succeeded),
            Self::UploadFailed { failed } => {
                write!(f, "{} uploads failed, will retry", failed)
            }
            Self::SyncDeferred => write!(f, "offline, sync scheduled for when the connection returns"),
            Self::SyncError { reason } => write!(f, "sync failed: {}", reason),
            Self::LoggedOut => write!(f, "signed out"),
        }
    }
}

/// Send a status update if someone is listening.
///
/// A closed receiver is not an error; the operator may have navigated away.
pub fn report(sink: Option<&StatusSender>, status: OperatorStatus) {
    if let Some(tx) = sink {
        let _ = tx.send(status);
    }
}
