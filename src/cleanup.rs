//! Periodic wipe of all ingested data.
//!
//! The feed never stops, so the tables are emptied on a fixed schedule to
//! keep the database small. While a wipe runs, [`CleanupStatus`] reports it
//! to anyone who asks; ingestion does not wait on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tracing::{error, info, warn};

use crate::store::{Store, StoreError};

/// Process-wide "cleanup in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct CleanupStatus(Arc<AtomicBool>);

impl CleanupStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn begin(&self) -> InProgress<'_> {
        self.0.store(true, Ordering::Release);
        InProgress(self)
    }
}

/// Clears the flag when dropped, however the cleanup ends.
struct InProgress<'a>(&'a CleanupStatus);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.0.store(false, Ordering::Release);
    }
}

pub struct CleanupJob {
    store: Arc<dyn Store>,
    status: CleanupStatus,
    max_retries: u32,
    retry_delay: Duration,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn Store>, status: CleanupStatus) -> Self {
        Self {
            store,
            status,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Empties every table, retrying up to `max_retries` times.
    pub async fn run_once(&self) -> Result<(), StoreError> {
        let _guard = self.status.begin();
        let mut attempt = 0;

        loop {
            match self.store.truncate_all().await {
                Ok(()) => {
                    info!(attempt, "Cleanup completed successfully");
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Error during cleanup, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(error = %e, "Cleanup failed");
                    return Err(e);
                }
            }
        }
    }

    /// Runs a cleanup every `period`, starting one period from now. A failed
    /// run is logged and the schedule continues.
    pub async fn run_every(&self, period: Duration) {
        info!(period_secs = period.as_secs(), "Database cleanup scheduled");
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            ticker.tick().await;
            warn!("Starting database cleanup");
            // Failures are already logged by run_once.
            let _ = self.run_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewBusStatus, NewStop};
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::Mutex;

    /// Fails `truncate_all` a fixed number of times and records whether the
    /// flag was raised while it ran.
    struct Flaky {
        inner: MemoryStore,
        failures_left: Mutex<u32>,
        status: CleanupStatus,
        seen_in_progress: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl Store for Flaky {
        async fn upsert_bus(&self, v: i32, operator: &str) -> Result<(), StoreError> {
            self.inner.upsert_bus(v, operator).await
        }
        async fn upsert_stop_event(
            &self,
            id: i64,
            status: &str,
            arrival_time: Option<NaiveTime>,
        ) -> Result<(), StoreError> {
            self.inner.upsert_stop_event(id, status, arrival_time).await
        }
        async fn insert_stop(&self, stop: &NewStop) -> Result<i64, StoreError> {
            self.inner.insert_stop(stop).await
        }
        async fn bus_exists(&self, v: i32) -> Result<bool, StoreError> {
            self.inner.bus_exists(v).await
        }
        async fn stop_exists(&self, id: i64) -> Result<bool, StoreError> {
            self.inner.stop_exists(id).await
        }
        async fn insert_bus_status(&self, s: &NewBusStatus) -> Result<i64, StoreError> {
            self.inner.insert_bus_status(s).await
        }
        async fn delete_bus_statuses(&self, v: i32) -> Result<u64, StoreError> {
            self.inner.delete_bus_statuses(v).await
        }
        async fn last_known_location(
            &self,
            v: i32,
            unresolved: &str,
        ) -> Result<Option<String>, StoreError> {
            self.inner.last_known_location(v, unresolved).await
        }
        async fn truncate_all(&self) -> Result<(), StoreError> {
            self.seen_in_progress
                .lock()
                .unwrap()
                .push(self.status.in_progress());
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
                }
            }
            self.inner.truncate_all().await
        }
    }

    fn flaky(failures: u32) -> (Arc<Flaky>, CleanupStatus) {
        let status = CleanupStatus::new();
        let store = Arc::new(Flaky {
            inner: MemoryStore::new(),
            failures_left: Mutex::new(failures),
            status: status.clone(),
            seen_in_progress: Mutex::new(Vec::new()),
        });
        (store, status)
    }

    #[tokio::test]
    async fn test_run_once_empties_tables_and_clears_flag() {
        let (store, status) = flaky(0);
        store.upsert_bus(1, "Op").await.unwrap();

        let job = CleanupJob::new(store.clone(), status.clone());
        job.run_once().await.unwrap();

        assert!(store.inner.is_empty());
        assert!(!status.in_progress());
        assert_eq!(*store.seen_in_progress.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_run_once_retries() {
        let (store, status) = flaky(2);
        let job = CleanupJob::new(store.clone(), status.clone()).with_retry(3, Duration::ZERO);

        job.run_once().await.unwrap();

        assert_eq!(store.seen_in_progress.lock().unwrap().len(), 3);
        assert!(!status.in_progress());
    }

    #[tokio::test]
    async fn test_run_once_gives_up() {
        let (store, status) = flaky(10);
        let job = CleanupJob::new(store.clone(), status.clone()).with_retry(3, Duration::ZERO);

        assert!(job.run_once().await.is_err());
        assert_eq!(store.seen_in_progress.lock().unwrap().len(), 4);
        assert!(!status.in_progress());
    }
}
