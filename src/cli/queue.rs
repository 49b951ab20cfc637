//! Capture and queue inspection commands.
//!
//! - `koeno record <file>` - Capture a file as one recording
//! - `koeno status` - Show queue counts
//! - `koeno list` - List recent recordings

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use super::{open_queue, restore_session, status_printer};
use crate::capture::{CaptureSession, FileInput};
use crate::domain::UploadStatus;

/// Capture `file` and commit it to the local queue
pub async fn execute_record(file: &Path, note: &str) -> Result<()> {
    let (_, context) = restore_session().await?;
    if !context.is_signed_in() {
        anyhow::bail!("Not signed in. Run `koeno login <caregiver-id>` first");
    }

    let queue = open_queue().await?;
    let (status_tx, printer) = status_printer();

    let input = Arc::new(FileInput::new(file));
    let mut capture = CaptureSession::new(input, queue, context).with_status(status_tx);

    let started = capture.start().await;
    let result = match started {
        Ok(()) => capture.stop(note).await,
        Err(e) => {
            drop(capture);
            Err(e)
        }
    };
    // The session owned the last sender
    let _ = printer.await;

    let entry = result?;
    println!(
        "✅ Saved recording #{} ({} bytes), waiting for sync",
        entry.id,
        entry.payload.len()
    );

    Ok(())
}

/// Show queue counts
pub async fn execute_status() -> Result<()> {
    let queue = open_queue().await?;
    let summary = queue.summary().await?;
    let (_, context) = restore_session().await?;

    println!("Local Recording Queue");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    if let Some(path) = queue.path() {
        println!("Database:    {}", path.display());
    }
    match context.owner_id() {
        Some(id) => println!("Signed in:   {}", id),
        None => println!("Signed in:   (nobody)"),
    }
    println!();
    println!("Queue:");
    println!("  Pending:   {}", summary.pending);
    println!("  Uploaded:  {}", summary.uploaded);
    println!("  Total:     {}", summary.total());

    if let Some(oldest) = summary.oldest_pending {
        let age = Utc::now().signed_duration_since(oldest);
        println!();
        println!(
            "Oldest pending: {} ({} min ago)",
            oldest.format("%Y-%m-%d %H:%M:%S UTC"),
            age.num_minutes()
        );
    }

    Ok(())
}

/// List recent recordings, newest first
pub async fn execute_list(status: Option<UploadStatus>, limit: usize) -> Result<()> {
    let queue = open_queue().await?;
    let entries = queue.recent(status, limit).await?;

    if entries.is_empty() {
        println!("No recordings in queue");
        if let Some(status) = status {
            println!("  (filtered by status: {})", status);
        }
        return Ok(());
    }

    println!();
    println!(
        "{:<8} {:<10} {:<14} {:<10} {:<20} {:<24}",
        "ID", "STATUS", "CAREGIVER", "BYTES", "CREATED", "NOTE"
    );
    println!("{}", "-".repeat(90));

    for entry in &entries {
        let note = if entry.note.chars().count() > 22 {
            format!("{}...", entry.note.chars().take(19).collect::<String>())
        } else {
            entry.note.clone()
        };

        println!(
            "{:<8} {:<10} {:<14} {:<10} {:<20} {:<24}",
            entry.id,
            entry.status.to_string(),
            entry.owner_id,
            entry.payload_len,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            note
        );
    }

    Ok(())
}
