//! Backend reachability probe.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::ApiSettings;

/// Answers "can we reach the backend right now?"
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes the API base URL. Any HTTP answer, even an error status, counts as
/// reachable; only transport failures count as offline.
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(api: &ApiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout(api))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: api.base_url.clone(),
            client,
        })
    }
}

/// Probes stay short even when uploads are allowed to take longer
fn probe_timeout(api: &ApiSettings) -> Duration {
    Duration::from_secs(api.timeout_seconds.clamp(1, 10))
}

#[async_trait]
impl Reachability for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Backend unreachable: {}", e);
                false
            }
        }
    }
}
