//! Upload of queued recordings.
//!
//! ```text
//!            ┌── lock (online) ────────────────┐
//!            │                                 ▼
//!   LockController ── lock (offline) ──▶ SyncRegistry ──▶ BackgroundSync ──▶ SyncEngine::drain
//!                                                 (on reconnect)               │
//!                                                                       Uploader + QueueStore
//! ```

pub mod background;
pub mod connectivity;
pub mod engine;

pub use background::BackgroundSync;
pub use connectivity::{ConnectivityObserver, ManualConnectivity, ProbeConnectivity};
pub use engine::{DrainResult, SyncEngine};
