use std::time::Duration;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::notification_registry::Registry;

/// Running expiry sweeper. Dropping the handle does not stop the task;
/// call [`SweeperHandle::shutdown`].
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Cancel the sweeper and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        self.task.await
    }
}

/// Periodically removes notifications older than `max_age`. This only catches
/// notifications nobody acknowledged; viewed ones are removed on their own.
pub fn start_expiry_sweeper(registry: Registry, every: Duration, max_age: Duration) -> SweeperHandle {
    if every.is_zero() {
        warn!("Sweep interval of zero is not allowed, using 1s");
    }
    let every = every.max(Duration::from_secs(1));
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = registry.sweep(max_age);
                    if removed > 0 {
                        warn!("Expiry sweep reclaimed {} unacknowledged notification(s)", removed);
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    });

    info!(
        "Expiry sweeper started (every {:?}, max age {:?})",
        every, max_age
    );
    SweeperHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::notification_models::{timestamp, Notification, Priority};
    use chrono::Utc;

    fn stale(registry: &Registry) -> Notification {
        let mut n = Notification::new("STALE".into(), Priority::Normal, None);
        n.created_at = timestamp(Utc::now() - chrono::Duration::minutes(20));
        registry.insert_raw(n.clone());
        n
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_after_interval() {
        let registry = Registry::default();
        let n = stale(&registry);
        let sweeper = start_expiry_sweeper(
            registry.clone(),
            Duration::from_secs(120),
            Duration::from_secs(600),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.get(&n.id).is_some());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.get(&n.id).is_none());

        sweeper.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweeping() {
        let registry = Registry::default();
        let sweeper = start_expiry_sweeper(
            registry.clone(),
            Duration::from_secs(120),
            Duration::from_secs(600),
        );
        sweeper.shutdown().await.unwrap();

        let n = stale(&registry);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(registry.get(&n.id).is_some());
    }
}
