//! Multipart upload of queued recordings.
//!
//! Endpoint: POST {api_base_url}/upload_recording
//! Fields: caregiver_id, memo_text, audio_blob (file), created_at_iso

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::{DeliveryError, TransferUnit, Uploader};
use crate::config::ApiSettings;

/// Upload client for the recordings endpoint
pub struct HttpUploader {
    /// Full upload URL
    url: String,
    /// File name reported for the audio part
    file_name: String,
    /// MIME type of the audio part
    mime_type: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpUploader {
    /// Create an uploader from API settings.
    ///
    /// The configured timeout is the only bound on a hung request.
    pub fn new(api: &ApiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: api.upload_url(),
            file_name: api.file_name.clone(),
            mime_type: api.mime_type.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the multipart form for one recording
    fn form(&self, unit: &TransferUnit) -> Result<Form, DeliveryError> {
        let audio = Part::bytes(unit.payload.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime_type)?;

        Ok(Form::new()
            .text("caregiver_id", unit.owner_id.clone())
            .text("memo_text", unit.note.clone())
            .part("audio_blob", audio)
            .text("created_at_iso", unit.created_at_iso.clone()))
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, unit: &TransferUnit) -> Result<(), DeliveryError> {
        let form = self.form(unit)?;

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    DeliveryError::Unreachable(e.to_string())
                } else {
                    DeliveryError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(id = unit.entry_id, %status, "Upload acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_url_from_settings() {
        let api = ApiSettings {
            base_url: "https://care.example.org/api/".to_string(),
            ..Default::default()
        };
        let uploader = HttpUploader::new(&api).unwrap();
        assert_eq!(uploader.url(), "https://care.example.org/api/upload_recording");
    }

    #[test]
    fn test_invalid_mime_type_is_delivery_error() {
        let api = ApiSettings {
            mime_type: "not a mime".to_string(),
            ..Default::default()
        };
        let uploader = HttpUploader::new(&api).unwrap();
        let unit = TransferUnit {
            entry_id: 1,
            owner_id: "cg-01".to_string(),
            note: String::new(),
            payload: Vec::new(),
            created_at_iso: "2024-01-01T00:00:00.000Z".to_string(),
        };

        assert!(matches!(uploader.form(&unit), Err(DeliveryError::Network(_))));
    }
}
