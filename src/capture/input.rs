//! Audio inputs.
//!
//! The platform owns the actual microphone and codec. This module only
//! describes what a capture session needs from it: exclusive acquisition,
//! pause/resume, and the encoded audio at the end.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by an audio input
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Microphone is busy")]
    Busy,

    #[error("Audio source not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A capture device that can be acquired by one session at a time
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Human-readable device name
    fn name(&self) -> &str;

    /// Acquire the device and start capturing
    async fn acquire(&self) -> Result<Box<dyn AudioStream>, DeviceError>;
}

/// An acquired, capturing device.
///
/// Dropping the stream releases the device. `finish` releases it too, before
/// returning.
#[async_trait]
pub trait AudioStream: Send {
    /// Suspend accumulation, keeping what was captured so far
    fn pause(&mut self);

    /// Continue accumulating after `pause`
    fn resume(&mut self);

    /// Stop capturing and hand back the encoded audio
    async fn finish(self: Box<Self>) -> Result<Vec<u8>, DeviceError>;
}

/// Audio input that delivers an existing audio file as one capture.
///
/// Lets recordings made elsewhere go through the same capture, queue and sync
/// path as live ones.
pub struct FileInput {
    path: PathBuf,
    name: String,
    in_use: Arc<AtomicBool>,
}

impl FileInput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        Self {
            path,
            name,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl AudioInput for FileInput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> Result<Box<dyn AudioStream>, DeviceError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DeviceError::Busy);
        }

        let audio = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.in_use.store(false, Ordering::Release);
                return Err(match e.kind() {
                    std::io::ErrorKind::NotFound => DeviceError::NotFound(self.path.clone()),
                    std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
                    _ => DeviceError::Io(e),
                });
            }
        };

        Ok(Box::new(FileStream {
            audio,
            in_use: Arc::clone(&self.in_use),
        }))
    }
}

struct FileStream {
    audio: Vec<u8>,
    in_use: Arc<AtomicBool>,
}

#[async_trait]
impl AudioStream for FileStream {
    // A file is captured whole at acquisition; nothing to suspend.
    fn pause(&mut self) {}

    fn resume(&mut self) {}

    async fn finish(self: Box<Self>) -> Result<Vec<u8>, DeviceError> {
        let mut stream = self;
        Ok(std::mem::take(&mut stream.audio))
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        self.in_use.store(false, Ordering::Release);
    }
}
