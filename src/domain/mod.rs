//! Domain types for koeno.
//!
//! - Entry: queued recordings and their upload status
//! - Status: operator-facing progress messages

pub mod entry;
pub mod status;

// Re-export commonly used types
pub use entry::{format_wire_timestamp, EntryId, EntryInfo, NewEntry, QueueEntry, UploadStatus};
pub use status::{report, OperatorStatus, StatusSender};
