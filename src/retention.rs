//! Background deletion of expired messages.

use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::store::MessageStore;

pub const DEFAULT_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Sweeps once when spawned and then every `interval` until shut down.
pub struct RetentionTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RetentionTask {
    pub fn spawn(store: MessageStore, horizon: Duration, interval: Duration) -> RetentionTask {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep_once(&store, horizon).await;
                    }
                    _ = stop.changed() => break,
                }
            }
            tracing::debug!("retention task stopped");
        });

        tracing::info!(?horizon, ?interval, "retention sweep scheduled");
        RetentionTask { shutdown, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "retention task ended abnormally");
        }
    }
}

/// Runs one sweep. Failures are logged and swallowed.
pub async fn sweep_once(store: &MessageStore, horizon: Duration) -> u64 {
    match store.sweep_expired(horizon).await {
        Ok(0) => 0,
        Ok(deleted) => {
            tracing::info!(deleted, "deleted expired messages");
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "retention sweep failed");
            0
        }
    }
}
