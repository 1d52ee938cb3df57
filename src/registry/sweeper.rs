// src/registry/sweeper.rs
// Periodic eviction of expired registry entries

use super::FileRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Stops the sweep task. Dropping the handle leaves the task running.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

pub fn spawn_sweeper(registry: Arc<FileRegistry>, interval: Duration) -> SweeperHandle {
    let (tx, mut rx) = watch::channel(false);
    let period = interval.max(Duration::from_secs(1));

    let join = tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "File sweeper started");
        let mut ticker = tokio::time::interval(period);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = registry.sweep();
                    if removed > 0 {
                        info!(removed, remaining = registry.len(), "Swept expired files");
                    } else {
                        debug!("Sweep found nothing to remove");
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("File sweeper stopped");
    });

    SweeperHandle { shutdown: tx, join }
}
