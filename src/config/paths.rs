//! Canonical paths for koeno state.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Path | Owner | Purpose |
//! |------|-------|---------|
//! | `koeno.db` | queue | Recordings and sync registrations |
//! | `session.json` | auth | Signed-in caregiver between CLI invocations |
//! | `sync.lock` | background sync | One background runner at a time |

use std::path::PathBuf;

use anyhow::Result;

/// Get the koeno home directory (~/.koeno)
pub fn koeno_home() -> Result<PathBuf> {
    crate::config::koeno_home()
}

/// Get the queue database path (~/.koeno/koeno.db unless configured)
pub fn queue_db() -> Result<PathBuf> {
    Ok(crate::config::config()?.database.clone())
}

/// Get the persisted session file (~/.koeno/session.json)
pub fn session_file() -> Result<PathBuf> {
    Ok(koeno_home()?.join("session.json"))
}

/// Get the background sync lock file (~/.koeno/sync.lock)
pub fn sync_lock() -> Result<PathBuf> {
    Ok(koeno_home()?.join("sync.lock"))
}
