//! Expiry of in-memory status records.
//!
//! Redis records carry a TTL; the in-memory store has none, so this task
//! drops records that have not changed within the same window.

use std::sync::Arc;
use std::time::Duration;

use reel_queue::MemoryStatusStore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Interval between sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct StaleStatusSweeper {
    store: Arc<MemoryStatusStore>,
    max_age: chrono::Duration,
}

impl StaleStatusSweeper {
    pub fn new(store: Arc<MemoryStatusStore>, ttl_secs: u64) -> Self {
        let secs = ttl_secs.min(i64::MAX as u64 / 1000) as i64;
        let max_age = chrono::Duration::seconds(secs);
        Self { store, max_age }
    }

    /// Sweep until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting status sweeper (interval: {:?}, max age: {})", SWEEP_INTERVAL, self.max_age);

        let mut ticker = interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.sweep().await;
        }
    }

    /// Run a single sweep, returning the number of records removed.
    pub async fn sweep(&self) -> usize {
        let removed = self.store.purge_stale(self.max_age).await;
        if removed > 0 {
            info!("Expired {} stale job records", removed);
        } else {
            debug!("No stale job records");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reel_models::JobId;
    use reel_queue::JobStatusStore;

    #[tokio::test]
    async fn test_sweep_keeps_fresh_records() {
        let store = Arc::new(MemoryStatusStore::new());
        let id = JobId::new();
        store.create(&id, Utc::now()).await.unwrap();

        let sweeper = StaleStatusSweeper::new(store.clone(), 3600);
        assert_eq!(sweeper.sweep().await, 0);
        tokio_test::assert_ok!(store.get(&id).await);

        let expired = StaleStatusSweeper::new(store.clone(), 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(expired.sweep().await, 1);
    }
}
