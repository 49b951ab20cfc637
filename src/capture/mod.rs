//! Recording capture.
//!
//! A `CaptureSession` owns one recording from start to commit:
//!
//! ```text
//! idle ──start──▶ recording ◀──resume── paused
//!                     │  └──pause──▶────┘
//!                   stop (from any state, consumes the session)
//!                     ▼
//!            exactly one QueueEntry (pending)
//! ```

pub mod input;
pub mod session;

use thiserror::Error;

use crate::queue::QueueError;

pub use input::{AudioInput, AudioStream, DeviceError, FileInput};
pub use session::{CaptureSession, CaptureState};

/// Errors surfaced to the caregiver during capture
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Microphone could not be acquired; the session stays idle
    #[error("Microphone unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    /// The queue refused the recording; the audio is lost
    #[error("Could not save the recording locally: {0}")]
    LocalWriteFailure(#[source] QueueError),

    /// Nobody is signed in to own the recording
    #[error("Session expired; sign in again")]
    SessionExpired,
}
