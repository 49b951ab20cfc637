//! Role lookup against the caregiver administration endpoint.
//!
//! Endpoint: GET {api_base_url}/admin/caregivers
//! Auth: X-Caller-ID header carrying the caregiver id
//!
//! 200 means the caller may administer caregivers. 401/403 means regular
//! staff. Anything else, including a network failure, also falls back to
//! staff so sign-in never depends on the backend being up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::{Role, RoleSource};
use crate::config::ApiSettings;

/// Header the backend reads the caller's caregiver id from
pub const CALLER_ID_HEADER: &str = "X-Caller-ID";

/// Role source backed by the admin API
pub struct HttpRoleSource {
    url: String,
    client: reqwest::Client,
}

impl HttpRoleSource {
    pub fn new(api: &ApiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(api.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: api.url("/admin/caregivers"),
            client,
        })
    }
}

/// Map the admin endpoint's answer to a role
fn role_from_status(status: StatusCode) -> Role {
    if status.is_success() {
        Role::Admin
    } else {
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN {
            tracing::warn!(%status, "Unexpected answer from role check, assuming staff");
        }
        Role::Staff
    }
}

#[async_trait]
impl RoleSource for HttpRoleSource {
    async fn role_for(&self, caregiver_id: &str) -> Role {
        let response = self
            .client
            .get(&self.url)
            .header(CALLER_ID_HEADER, caregiver_id)
            .send()
            .await;

        match response {
            Ok(resp) => role_from_status(resp.status()),
            Err(e) => {
                tracing::warn!("Role check failed, assuming staff: {}", e);
                Role::Staff
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_status() {
        assert_eq!(role_from_status(StatusCode::OK), Role::Admin);
        assert_eq!(role_from_status(StatusCode::UNAUTHORIZED), Role::Staff);
        assert_eq!(role_from_status(StatusCode::FORBIDDEN), Role::Staff);
        assert_eq!(role_from_status(StatusCode::INTERNAL_SERVER_ERROR), Role::Staff);
    }
}
