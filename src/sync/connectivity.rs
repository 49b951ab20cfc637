//! Connectivity observation.
//!
//! The background runner and the lock controller only ask "online?" and
//! "tell me when it changes". Where the answer comes from is injected: a
//! probe loop in production, a manual switch in tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::Reachability;

/// Source of online/offline state
pub trait ConnectivityObserver: Send + Sync {
    fn is_online(&self) -> bool;

    /// Receiver that sees every later transition
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity set explicitly by the caller
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl ConnectivityObserver for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Connectivity derived from probing the backend on an interval.
///
/// Starts offline until the first probe answers. The probe task stops when
/// this value is dropped.
pub struct ProbeConnectivity {
    tx: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl ProbeConnectivity {
    pub fn spawn(probe: Arc<dyn Reachability>, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        let tx = Arc::new(tx);

        let task = tokio::spawn({
            let tx = Arc::clone(&tx);
            async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let online = probe.is_reachable().await;
                    tx.send_if_modified(|current| {
                        if *current == online {
                            return false;
                        }
                        tracing::info!(online, "Connectivity changed");
                        *current = online;
                        true
                    });
                }
            }
        });

        Self { tx, task }
    }
}

impl ConnectivityObserver for ProbeConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Drop for ProbeConnectivity {
    fn drop(&mut self) {
        self.task.abort();
    }
}
