//! Signed-in caregiver identity.
//!
//! `SessionContext` is the one place the current operator lives. It is created
//! empty, filled by [`login`], and emptied by `logout`. Capture sessions and the
//! lock controller hold a clone and read the operator when they need it, so a
//! logout is seen everywhere at once.

pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

pub use store::SessionFile;

/// Errors that can occur while signing in
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Caregiver id must not be empty")]
    EmptyId,
}

/// What the signed-in caregiver may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May open the administration pages
    Admin,

    /// Regular care staff
    Staff,
}

/// The authenticated caregiver for the current shift
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Caregiver id, stamped on every recording as its owner
    pub caregiver_id: String,

    pub role: Role,

    /// Identifies this sign-in in logs
    pub session_id: Uuid,

    pub signed_in_at: DateTime<Utc>,
}

impl Operator {
    pub fn new(caregiver_id: impl Into<String>, role: Role) -> Self {
        Self {
            caregiver_id: caregiver_id.into(),
            role,
            session_id: Uuid::new_v4(),
            signed_in_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Decides the role of a caregiver at sign-in
#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn role_for(&self, caregiver_id: &str) -> Role;
}

/// Shared handle to the current operator
#[derive(Debug, Clone)]
pub struct SessionContext {
    current: Arc<watch::Sender<Option<Operator>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// A context with nobody signed in
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            current: Arc::new(tx),
        }
    }

    /// A context restored from a previous sign-in
    pub fn signed_in(operator: Operator) -> Self {
        let context = Self::new();
        context.login(operator);
        context
    }

    /// Replace the current operator
    pub fn login(&self, operator: Operator) {
        tracing::info!(
            caregiver = %operator.caregiver_id,
            session = %operator.session_id,
            "Signed in"
        );
        self.current.send_replace(Some(operator));
    }

    /// Tear down the session, returning who was signed in
    pub fn logout(&self) -> Option<Operator> {
        let previous = self.current.send_replace(None);
        if let Some(ref op) = previous {
            tracing::info!(
                caregiver = %op.caregiver_id,
                session = %op.session_id,
                "Signed out"
            );
        }
        previous
    }

    pub fn operator(&self) -> Option<Operator> {
        self.current.borrow().clone()
    }

    /// Caregiver id of the current operator
    pub fn owner_id(&self) -> Option<String> {
        self.current
            .borrow()
            .as_ref()
            .map(|op| op.caregiver_id.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.borrow().is_some()
    }
}

/// Sign `caregiver_id` in, replacing whoever was signed in before.
///
/// The role lookup never blocks the sign-in: a failed lookup yields `Staff`.
pub async fn login(
    context: &SessionContext,
    roles: &dyn RoleSource,
    caregiver_id: &str,
) -> Result<Operator, AuthError> {
    let caregiver_id = caregiver_id.trim();
    if caregiver_id.is_empty() {
        return Err(AuthError::EmptyId);
    }

    context.logout();

    let role = roles.role_for(caregiver_id).await;
    let operator = Operator::new(caregiver_id, role);
    context.login(operator.clone());

    Ok(operator)
}
