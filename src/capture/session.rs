//! Capture session state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::{AudioInput, AudioStream, CaptureError};
use crate::auth::SessionContext;
use crate::domain::{report, NewEntry, OperatorStatus, QueueEntry, StatusSender, UploadStatus};
use crate::queue::QueueStore;

/// Where a live capture session is in its lifecycle.
///
/// There is no `Stopped` value: `stop` consumes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Paused,
}

/// One recording, from microphone acquisition to its queue entry
pub struct CaptureSession {
    input: Arc<dyn AudioInput>,
    queue: Arc<dyn QueueStore>,
    session: SessionContext,
    status: Option<StatusSender>,
    state: CaptureState,
    stream: Option<Box<dyn AudioStream>>,
    /// Recorded time in finished segments
    recorded: Duration,
    /// Start of the segment being recorded now
    segment_started: Option<Instant>,
}

impl CaptureSession {
    /// Create an idle session
    pub fn new(
        input: Arc<dyn AudioInput>,
        queue: Arc<dyn QueueStore>,
        session: SessionContext,
    ) -> Self {
        Self {
            input,
            queue,
            session,
            status: None,
            state: CaptureState::Idle,
            stream: None,
            recorded: Duration::ZERO,
            segment_started: None,
        }
    }

    /// Publish operator status updates to `status`
    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = Some(status);
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Recording or paused
    pub fn is_active(&self) -> bool {
        matches!(self.state, CaptureState::Recording | CaptureState::Paused)
    }

    /// Time spent recording, excluding pauses
    pub fn elapsed(&self) -> Duration {
        self.recorded
            + self
                .segment_started
                .map(|started| started.elapsed())
                .unwrap_or_default()
    }

    /// Acquire the microphone and start recording.
    ///
    /// Only valid from `Idle`; anywhere else it does nothing.
    #[instrument(skip(self), fields(input = %self.input.name()))]
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            debug!(state = ?self.state, "Start ignored, already capturing");
            return Ok(());
        }

        if !self.session.is_signed_in() {
            report(self.status.as_ref(), OperatorStatus::SessionExpired);
            return Err(CaptureError::SessionExpired);
        }

        report(self.status.as_ref(), OperatorStatus::PreparingMicrophone);
        let stream = match self.input.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Microphone unavailable: {}", e);
                report(
                    self.status.as_ref(),
                    OperatorStatus::MicrophoneUnavailable {
                        reason: e.to_string(),
                    },
                );
                return Err(CaptureError::DeviceUnavailable(e));
            }
        };

        self.stream = Some(stream);
        self.state = CaptureState::Recording;
        self.segment_started = Some(Instant::now());
        info!("Recording started");
        report(self.status.as_ref(), OperatorStatus::Recording);

        Ok(())
    }

    /// Suspend recording. Does nothing unless recording.
    pub fn pause(&mut self) {
        if self.state != CaptureState::Recording {
            return;
        }

        if let Some(stream) = self.stream.as_mut() {
            stream.pause();
        }
        self.close_segment();
        self.state = CaptureState::Paused;
        report(self.status.as_ref(), OperatorStatus::Paused);
    }

    /// Continue after `pause`. Does nothing unless paused.
    pub fn resume(&mut self) {
        if self.state != CaptureState::Paused {
            return;
        }

        if let Some(stream) = self.stream.as_mut() {
            stream.resume();
        }
        self.segment_started = Some(Instant::now());
        self.state = CaptureState::Recording;
        report(self.status.as_ref(), OperatorStatus::Recording);
    }

    /// Stop recording and commit the audio to the queue.
    ///
    /// Releases the microphone first, then appends exactly one entry, even
    /// when no audio was captured. Returns once the entry is durable.
    #[instrument(skip_all)]
    pub async fn stop(mut self, note: impl Into<String>) -> Result<QueueEntry, CaptureError> {
        let from = self.state;
        self.close_segment();

        let payload = match self.stream.take() {
            Some(stream) => match stream.finish().await {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Audio input failed while finishing, committing empty capture: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        report(self.status.as_ref(), OperatorStatus::Saving);

        let owner_id = match self.session.owner_id() {
            Some(id) => id,
            None => {
                warn!(bytes = payload.len(), "No signed-in caregiver at commit, recording dropped");
                report(self.status.as_ref(), OperatorStatus::SessionExpired);
                return Err(CaptureError::SessionExpired);
            }
        };

        let new_entry = NewEntry::new(owner_id, payload, note, Utc::now());
        let id = match self.queue.append(new_entry.clone()).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Local queue write failed, recording lost: {}", e);
                report(
                    self.status.as_ref(),
                    OperatorStatus::SaveFailed {
                        reason: e.to_string(),
                    },
                );
                return Err(CaptureError::LocalWriteFailure(e));
            }
        };

        info!(
            id,
            from = ?from,
            bytes = new_entry.payload.len(),
            seconds = self.elapsed().as_secs_f32(),
            "Recording saved locally"
        );
        report(self.status.as_ref(), OperatorStatus::SavedLocally { id });

        Ok(QueueEntry {
            id,
            owner_id: new_entry.owner_id,
            payload: new_entry.payload,
            note: new_entry.note,
            created_at: new_entry.created_at,
            status: UploadStatus::Pending,
            uploaded_at: None,
        })
    }

    fn close_segment(&mut self) {
        if let Some(started) = self.segment_started.take() {
            self.recorded += started.elapsed();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // The stream's own Drop releases the device
        if self.stream.is_some() {
            warn!(state = ?self.state, "Capture session dropped without stop, audio discarded");
        }
    }
}
