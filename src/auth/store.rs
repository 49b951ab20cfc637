//! Session persistence between CLI invocations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use super::Operator;

/// JSON file holding the signed-in operator
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Session file in the default location (~/.koeno/session.json)
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::config::paths::session_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the operator, if one was saved
    pub async fn load(&self) -> Result<Option<Operator>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;

        let operator = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", self.path.display()))?;

        Ok(Some(operator))
    }

    pub async fn save(&self, operator: &Operator) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(operator).context("Failed to serialize session")?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;

        Ok(())
    }

    /// Forget the saved operator (no-op if none)
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove session file: {}", self.path.display())),
        }
    }
}
