//! Command-line interface for koeno.
//!
//! Operator and diagnostic commands around the capture core: sign in and
//! out, capture a recording, inspect the local queue, and sync it.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapters::HttpRoleSource;
use crate::auth::{self, SessionContext, SessionFile};
use crate::config;
use crate::domain::{OperatorStatus, StatusSender, UploadStatus};
use crate::queue::SqliteQueue;

pub mod queue;
pub mod sync;

/// koeno - Offline-first care-round recording capture
#[derive(Parser, Debug)]
#[command(name = "koeno")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in as a caregiver
    Login {
        /// Caregiver id stamped on every recording
        caregiver_id: String,
    },

    /// Sign out without syncing
    Logout,

    /// Show the signed-in caregiver
    Whoami,

    /// Capture an audio file as a recording and save it locally
    Record {
        /// Audio file to capture
        file: std::path::PathBuf,

        /// Memo text attached to the recording
        #[arg(short, long, default_value = "")]
        note: String,
    },

    /// Show local queue status
    Status,

    /// List recordings in the local queue
    List {
        /// Filter by upload status
        #[arg(short, long, value_enum)]
        status: Option<StatusFilter>,

        /// Maximum number of recordings to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Upload pending recordings now
    Sync,

    /// End the shift: sync (or defer when offline), then sign out
    Lock {
        /// Skip the connectivity check and defer the sync
        #[arg(long)]
        offline: bool,
    },

    /// Run deferred syncs whenever the backend becomes reachable
    Watch,

    /// Show resolved configuration (debug)
    Config,
}

/// Upload status for CLI (maps to UploadStatus)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Pending,
    Uploaded,
}

impl From<StatusFilter> for UploadStatus {
    fn from(s: StatusFilter) -> Self {
        match s {
            StatusFilter::Pending => UploadStatus::Pending,
            StatusFilter::Uploaded => UploadStatus::Uploaded,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Login { caregiver_id } => login(&caregiver_id).await,
            Commands::Logout => logout().await,
            Commands::Whoami => whoami().await,
            Commands::Record { file, note } => queue::execute_record(&file, &note).await,
            Commands::Status => queue::execute_status().await,
            Commands::List { status, limit } => {
                queue::execute_list(status.map(Into::into), limit).await
            }
            Commands::Sync => sync::execute_sync().await,
            Commands::Lock { offline } => sync::execute_lock(offline).await,
            Commands::Watch => sync::execute_watch().await,
            Commands::Config => show_config().await,
        }
    }
}

/// Open the default queue, shared across components
pub(crate) async fn open_queue() -> Result<Arc<SqliteQueue>> {
    let queue = SqliteQueue::open_default()
        .await
        .context("Failed to open the local queue")?;
    Ok(Arc::new(queue))
}

/// Restore the persisted session into a fresh context
pub(crate) async fn restore_session() -> Result<(SessionFile, SessionContext)> {
    let file = SessionFile::open_default()?;
    let context = match file.load().await? {
        Some(operator) => SessionContext::signed_in(operator),
        None => SessionContext::new(),
    };
    Ok((file, context))
}

/// Print operator status lines until every sender is dropped
pub(crate) fn status_printer() -> (StatusSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OperatorStatus>();
    let handle = tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            eprintln!("  {}", status);
        }
    });
    (tx, handle)
}

/// Sign in, replacing any previous session
async fn login(caregiver_id: &str) -> Result<()> {
    let cfg = config::config()?;
    let (file, context) = restore_session().await?;

    let roles = HttpRoleSource::new(&cfg.api)?;
    let operator = auth::login(&context, &roles, caregiver_id).await?;
    file.save(&operator).await?;

    println!("✅ Signed in as {}", operator.caregiver_id);
    if operator.is_admin() {
        println!("   Role: admin");
    }
    Ok(())
}

/// Sign out without touching the queue
async fn logout() -> Result<()> {
    let (file, context) = restore_session().await?;

    match context.logout() {
        Some(operator) => println!("👋 Signed out {}", operator.caregiver_id),
        None => println!("Not signed in"),
    }
    file.clear().await?;

    Ok(())
}

async fn whoami() -> Result<()> {
    let (_, context) = restore_session().await?;

    match context.operator() {
        Some(operator) => {
            println!("Caregiver:  {}", operator.caregiver_id);
            println!("Role:       {:?}", operator.role);
            println!("Signed in:  {}", operator.signed_in_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Session:    {}", operator.session_id);
        }
        None => println!("Not signed in"),
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!();
    println!("koeno Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Database:  {}", cfg.database.display());
    println!("  Session:   {}", SessionFile::open_default()?.path().display());
    println!("  Sync lock: {}", config::paths::sync_lock()?.display());
    println!();
    println!("API:");
    println!("  Base URL:  {}", cfg.api.base_url);
    println!("  Upload:    {}", cfg.api.upload_url());
    println!("  Timeout:   {}s", cfg.api.timeout_seconds);
    println!("  File name: {} ({})", cfg.api.file_name, cfg.api.mime_type);
    println!();
    println!("Sync:");
    println!("  Tag:            {}", cfg.sync.tag);
    println!("  Probe interval: {}s", cfg.sync.probe_interval_seconds);

    Ok(())
}
