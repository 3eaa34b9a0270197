//! Background auto-save and pull intervals
//!
//! [`AutoSaver::start`] runs two interval tasks against one [`SyncClient`]:
//! pushing queued writes and pulling other devices' changes. The returned
//! [`SyncHandle`] stops both when stopped or dropped.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SyncConfig;

use super::client::SyncClient;
use super::types::RecordKey;

/// Records with a push in flight
#[derive(Clone, Default)]
pub struct InFlightRecords {
    inner: Arc<Mutex<HashSet<RecordKey>>>,
}

impl InFlightRecords {
    /// Mark a record as in flight; `None` if it already is
    pub fn try_claim(&self, key: &RecordKey) -> Option<InFlightGuard> {
        if !self.inner.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            records: self.clone(),
            key: key.clone(),
        })
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.inner.lock().contains(key)
    }
}

/// Releases the record when dropped
pub struct InFlightGuard {
    records: InFlightRecords,
    key: RecordKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.records.inner.lock().remove(&self.key);
    }
}

/// Shortest period accepted by [`AutoSaver`]
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(1);

/// Drives a [`SyncClient`] on fixed intervals
pub struct AutoSaver {
    client: Arc<SyncClient>,
    autosave_interval: Duration,
    pull_interval: Duration,
}

impl AutoSaver {
    pub fn new(client: Arc<SyncClient>, config: &SyncConfig) -> Self {
        Self::with_intervals(client, config.autosave_interval(), config.pull_interval())
    }

    /// Periods shorter than [`MIN_SYNC_INTERVAL`] are raised to it
    pub fn with_intervals(client: Arc<SyncClient>, autosave_interval: Duration, pull_interval: Duration) -> Self {
        Self {
            client,
            autosave_interval: at_least_minimum("auto-save", autosave_interval),
            pull_interval: at_least_minimum("pull", pull_interval),
        }
    }

    /// Spawn the interval tasks
    pub fn start(self) -> SyncHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let client = self.client.clone();
        let save = tokio::spawn(run_every(self.autosave_interval, shutdown_rx.clone(), move || {
            let client = client.clone();
            async move {
                match client.push_pending().await {
                    Ok(report) if report.accepted + report.conflicts > 0 => tracing::debug!(
                        "Auto-save pushed {} ({} conflicts, {} skipped)",
                        report.accepted,
                        report.conflicts,
                        report.skipped
                    ),
                    Ok(_) => {}
                    // Operations stay queued for the next tick
                    Err(e) => tracing::warn!("Auto-save failed: {}", e),
                }
            }
        }));

        let client = self.client;
        let pull = tokio::spawn(run_every(self.pull_interval, shutdown_rx, move || {
            let client = client.clone();
            async move {
                match client.pull().await {
                    Ok(0) => {}
                    Ok(applied) => tracing::debug!("Pulled {} remote changes", applied),
                    Err(e) => tracing::warn!("Sync pull failed: {}", e),
                }
            }
        }));

        tracing::info!(
            "Sync started (auto-save every {:?}, pull every {:?})",
            self.autosave_interval,
            self.pull_interval
        );

        SyncHandle {
            shutdown,
            tasks: vec![save, pull],
        }
    }
}

fn at_least_minimum(name: &str, period: Duration) -> Duration {
    if period < MIN_SYNC_INTERVAL {
        tracing::warn!("Sync {} interval {:?} is too short, using {:?}", name, period, MIN_SYNC_INTERVAL);
        return MIN_SYNC_INTERVAL;
    }
    period
}

async fn run_every<F, Fut>(period: Duration, mut shutdown: watch::Receiver<bool>, mut task: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    // First tick one period after start, not immediately
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => task().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Stops the sync intervals when stopped or dropped
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Signal the tasks and wait for them to finish
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        for result in futures::future::join_all(self.tasks.drain(..)).await {
            if let Err(e) = result {
                tracing::warn!("Sync task ended abnormally: {}", e);
            }
        }
        tracing::info!("Sync stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressUpdate;
    use crate::sync::client::{SyncError, SyncTransport};
    use crate::sync::local::LocalStore;
    use crate::sync::types::{EntityType, PullRequest, PullResponse, PushRequest, PushResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Holds the first push open until released and tracks overlap
    #[derive(Default)]
    struct GatedTransport {
        active: AtomicUsize,
        max_active: AtomicUsize,
        pushes: AtomicUsize,
        opened: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SyncTransport for GatedTransport {
        async fn push(&self, request: &PushRequest) -> Result<PushResponse, SyncError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            self.pushes.fetch_add(1, Ordering::SeqCst);

            if !self.opened.swap(true, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(PushResponse {
                accepted: request.operations.iter().map(|op| op.id.clone()).collect(),
                conflicts: vec![],
                cursor: 0,
            })
        }

        async fn pull(&self, request: &PullRequest) -> Result<PullResponse, SyncError> {
            Ok(PullResponse {
                operations: vec![],
                cursor: request.since,
                has_more: false,
            })
        }
    }

    fn update(percentage: f64) -> ProgressUpdate {
        ProgressUpdate {
            current_location: format!("loc-{}", percentage),
            percentage,
            current_page: None,
            total_pages: None,
            time_spent_delta: 30,
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let records = InFlightRecords::default();
        let key = RecordKey::new(EntityType::Progress, "book-1");

        let guard = records.try_claim(&key).unwrap();
        assert!(records.try_claim(&key).is_none());
        assert!(records.contains(&key));

        drop(guard);
        assert!(!records.contains(&key));
        assert!(records.try_claim(&key).is_some());
    }

    #[tokio::test]
    async fn test_busy_record_skipped_then_retried() {
        let store = Arc::new(LocalStore::new("user-1", "phone"));
        let transport = Arc::new(GatedTransport::default());
        let client = Arc::new(SyncClient::new(store.clone(), transport.clone()));

        store.record_progress("book-1", update(10.0)).await.unwrap();

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.push_pending().await }
        });
        transport.entered.notified().await;

        // A newer write to the same record while its push is in flight
        store.record_progress("book-1", update(20.0)).await.unwrap();
        let second = client.push_pending().await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.accepted, 0);
        assert_eq!(store.pending_count().await, 1);

        transport.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.accepted, 1);

        let third = client.push_pending().await.unwrap();
        assert_eq!(third.accepted, 1);
        assert_eq!(store.pending_count().await, 0);

        assert_eq!(transport.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(transport.pushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handle_stops_intervals() {
        let store = Arc::new(LocalStore::new("user-1", "phone"));
        let transport = Arc::new(GatedTransport::default());
        // The first push is never held open
        transport.opened.store(true, Ordering::SeqCst);
        let client = Arc::new(SyncClient::new(store.clone(), transport.clone()));

        let handle = AutoSaver::with_intervals(
            client,
            Duration::from_millis(10),
            Duration::from_millis(25),
        )
        .start();
        assert!(handle.is_running());

        store.record_progress("book-1", update(10.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.pending_count().await, 0);

        handle.stop().await;

        store.record_progress("book-1", update(20.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_zero_interval_still_saves() {
        let store = Arc::new(LocalStore::new("user-1", "phone"));
        let transport = Arc::new(GatedTransport::default());
        transport.opened.store(true, Ordering::SeqCst);
        let client = Arc::new(SyncClient::new(store.clone(), transport.clone()));

        let handle = AutoSaver::with_intervals(client, Duration::ZERO, Duration::ZERO).start();
        store.record_progress("book-1", update(10.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(handle.is_running());
        assert_eq!(store.pending_count().await, 0);
        handle.stop().await;
    }
}
