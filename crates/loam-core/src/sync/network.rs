//! Network status observation

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Current connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    /// Whether the device is currently online
    pub is_online: bool,
    /// Whether the previous state was offline
    pub was_offline: bool,
}

impl NetworkStatus {
    /// True exactly when the device just came back online
    #[must_use]
    pub const fn reconnected(self) -> bool {
        self.is_online && self.was_offline
    }
}

/// Environment-appropriate connectivity check, for platforms that do not
/// deliver connectivity events
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Tracks online/offline transitions and notifies subscribers.
///
/// Each transition publishes exactly one status change; setting the same
/// state twice is a no-op.
pub struct NetworkMonitor {
    sender: watch::Sender<NetworkStatus>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// Create a monitor with the given initial state
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(NetworkStatus {
            is_online: initially_online,
            was_offline: false,
        });
        Self {
            sender,
            probe_task: Mutex::new(None),
        }
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> NetworkStatus {
        *self.sender.borrow()
    }

    /// Whether the device is currently online
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status().is_online
    }

    /// Record a connectivity change; transitions notify subscribers once
    pub fn set_online(&self, online: bool) {
        publish_transition(&self.sender, online);
    }

    /// Subscribe to status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.sender.subscribe()
    }

    /// Poll connectivity in the background at the given interval.
    ///
    /// For platforms without native connectivity events. Replaces any probe
    /// started earlier.
    pub fn spawn_probe(&self, probe: Arc<dyn ConnectivityProbe>, interval: Duration) {
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let online = probe.check().await;
                publish_transition(&sender, online);
            }
        });

        if let Ok(mut slot) = self.probe_task.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the background probe, if one is running
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.probe_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Update the channel only on a real transition, so subscribers see exactly
/// one notification per offline/online flip
fn publish_transition(sender: &watch::Sender<NetworkStatus>, online: bool) {
    sender.send_if_modified(|status| {
        if status.is_online == online {
            return false;
        }
        *status = NetworkStatus {
            is_online: online,
            was_offline: !status.is_online,
        };
        true
    });
}
