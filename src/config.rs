//! Configuration for koeno.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (KOENO_HOME, KOENO_API_BASE_URL)
//! 2. Config file (.koeno/config.yaml)
//! 3. Defaults (~/.koeno, http://localhost:8000)
//!
//! Config file discovery:
//! - Searches current directory and parents for .koeno/config.yaml
//! - Relative `home` is resolved against the .koeno/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Default backend location when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Sync tag registered when locking while offline
pub const DEFAULT_SYNC_TAG: &str = "koeno-sync";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
    #[serde(default)]
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .koeno/)
    pub home: Option<String>,
    /// Queue database file name or path (relative to home)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub upload_path: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub tag: Option<String>,
    pub probe_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to koeno home (queue database, session, locks)
    pub home: PathBuf,
    /// Absolute path to the queue database
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Backend settings
    pub api: ApiSettings,
    /// Background sync settings
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub upload_path: String,
    /// Transport timeout for every HTTP request
    pub timeout_seconds: u64,
    pub file_name: String,
    pub mime_type: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            upload_path: "/upload_recording".to_string(),
            timeout_seconds: 120,
            file_name: "recording.webm".to_string(),
            mime_type: "audio/webm".to_string(),
        }
    }
}

impl ApiSettings {
    /// Full URL of an API path (`/upload_recording` → `{base}/upload_recording`)
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn upload_url(&self) -> String {
        self.url(&self.upload_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub tag: String,
    pub probe_interval_seconds: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tag: DEFAULT_SYNC_TAG.to_string(),
            probe_interval_seconds: 15,
        }
    }
}

impl SyncSettings {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_seconds.max(1))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".koeno").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a parsed config file over the defaults
fn apply_config_file(
    config: ConfigFile,
    config_path: &Path,
    default_home: PathBuf,
) -> (PathBuf, Option<String>, ApiSettings, SyncSettings) {
    let koeno_dir = config_path.parent().unwrap_or(Path::new("."));

    let home = match config.paths.home {
        Some(ref home_path) => resolve_path(koeno_dir, home_path),
        None => default_home,
    };

    let mut api = ApiSettings::default();
    if let Some(a) = config.api {
        if let Some(url) = a.base_url {
            api.base_url = url;
        }
        if let Some(path) = a.upload_path {
            api.upload_path = path;
        }
        if let Some(timeout) = a.timeout_seconds {
            api.timeout_seconds = timeout;
        }
    }
    if let Some(u) = config.upload {
        if let Some(name) = u.file_name {
            api.file_name = name;
        }
        if let Some(mime) = u.mime_type {
            api.mime_type = mime;
        }
    }

    let mut sync = SyncSettings::default();
    if let Some(s) = config.sync {
        if let Some(tag) = s.tag {
            sync.tag = tag;
        }
        if let Some(interval) = s.probe_interval_seconds {
            sync.probe_interval_seconds = interval;
        }
    }

    (home, config.paths.database, api, sync)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".koeno");

    // Check for config file
    let config_file = find_config_file();

    let (mut home, database, mut api, sync) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        apply_config_file(config, config_path, default_home)
    } else {
        (
            default_home,
            None,
            ApiSettings::default(),
            SyncSettings::default(),
        )
    };

    // Environment wins over the file
    if let Ok(env_home) = std::env::var("KOENO_HOME") {
        home = PathBuf::from(env_home);
    }
    if let Ok(env_url) = std::env::var("KOENO_API_BASE_URL") {
        api.base_url = env_url;
    }

    let database = match database {
        Some(db) => resolve_path(&home, &db),
        None => home.join("koeno.db"),
    };

    Ok(ResolvedConfig {
        home,
        database,
        config_file,
        api,
        sync,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the koeno home directory.
pub fn koeno_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}
