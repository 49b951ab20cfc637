//! koeno - Offline-first care-round recording capture
//!
//! Caregivers record short voice memos during a round. Every recording is
//! saved to a local durable queue first and uploaded to the care-records
//! backend later, whenever the network allows.
//!
//! # Architecture
//!
//! - Capture never touches the network: `stop` returns once the recording
//!   is durable in the local queue
//! - Upload is a separate drain of everything still pending; failures stay
//!   pending and are retried by the next drain
//! - Locking the shift stops capture, syncs (or defers the sync when
//!   offline), and always signs out
//!
//! # Modules
//!
//! - `auth`: Signed-in caregiver (`SessionContext`)
//! - `capture`: Recording state machine over an audio input
//! - `queue`: Local durable queue (SQLite)
//! - `sync`: Drain engine, connectivity, deferred background sync
//! - `lock`: End-of-shift sequence
//! - `adapters`: HTTP upload, role lookup, reachability probe
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! koeno login cg-042
//! koeno record memo.webm --note "room 12, slept well"
//! koeno lock
//! koeno watch   # delivers syncs deferred while offline
//! ```

pub mod adapters;
pub mod auth;
pub mod capture;
pub mod cli;
pub mod config;
pub mod domain;
pub mod lock;
pub mod queue;
pub mod sync;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root for convenience
pub use auth::{Operator, Role, SessionContext};
pub use capture::{CaptureError, CaptureSession, CaptureState};
pub use domain::{EntryId, NewEntry, OperatorStatus, QueueEntry, UploadStatus};
pub use lock::{LockController, LockOutcome, SyncOutcome};
pub use queue::{QueueError, QueueStore, SqliteQueue, SyncRegistry};
pub use sync::{BackgroundSync, DrainResult, SyncEngine};
