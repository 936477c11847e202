#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Poll loop that drives the fetch, normalize, merge, persist cycle.
//!
//! A [`Poller`] owns the master collection for the lifetime of the
//! process. It alternates between two phases:
//!
//! 1. **Fetching**: one fetch of the upstream feed, then normalization,
//!    merge into the [`Accumulator`], and a save through the configured
//!    [`StorageBackend`].
//! 2. **Idle**: waiting out the configured interval.
//!
//! The first cycle runs immediately. A shutdown signal is observed while
//! a fetch is in flight or while idle, never between merge and save.
//! On shutdown the collection is persisted one last time and closing
//! statistics are logged.

pub mod config;

use std::future::Future;
use std::time::Duration;

use traffic_incidents_accumulator::{Accumulator, MergeResult, Stats};
use traffic_incidents_source::{IncidentFeed, SourceError, normalize};
use traffic_incidents_storage::StorageBackend;

/// What a single [`Poller::run_cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The upstream fetch failed; nothing was merged or saved.
    FetchFailed,
    /// The payload was normalized, merged and a save was attempted.
    Completed {
        /// Incidents the normalizer produced from the payload.
        fetched: usize,
        /// Result of merging them into the master collection.
        merge: MergeResult,
        /// Whether the backend accepted the save.
        saved: bool,
    },
}

/// Owns the master collection and the collaborators that feed and
/// persist it.
pub struct Poller {
    feed: Box<dyn IncidentFeed>,
    backend: Box<dyn StorageBackend>,
    accumulator: Accumulator,
    interval: Duration,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("feed", &self.feed.describe())
            .field("backend", &self.backend.name())
            .field("incidents", &self.accumulator.len())
            .field("interval", &self.interval)
            .finish()
    }
}

impl Poller {
    /// Creates a poller around an already populated accumulator.
    #[must_use]
    pub fn new(
        feed: Box<dyn IncidentFeed>,
        backend: Box<dyn StorageBackend>,
        accumulator: Accumulator,
        interval: Duration,
    ) -> Self {
        Self {
            feed,
            backend,
            accumulator,
            interval,
        }
    }

    /// Loads the persisted collection from `backend` and creates a
    /// poller around it. A failed load starts from an empty collection.
    pub async fn start(
        feed: Box<dyn IncidentFeed>,
        backend: Box<dyn StorageBackend>,
        interval: Duration,
    ) -> Self {
        let accumulator = Accumulator::new(backend.load().await);

        log::info!("Polling {}", feed.describe());
        log::info!(
            "Interval: {}s | Backend: {} | Loaded: {}",
            interval.as_secs(),
            backend.name(),
            accumulator.len()
        );

        Self::new(feed, backend, accumulator, interval)
    }

    /// The master collection as it currently stands.
    #[must_use]
    pub const fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Runs one fetch, normalize, merge, persist cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.fetch().await {
            Ok(payload) => self.ingest(&payload).await,
            Err(e) => {
                log::warn!("Fetch failed, skipping cycle: {e}");
                CycleOutcome::FetchFailed
            }
        }
    }

    async fn fetch(&self) -> Result<serde_json::Value, SourceError> {
        log::info!("Fetching incidents ({} held)", self.accumulator.len());
        self.feed.fetch().await
    }

    async fn ingest(&mut self, payload: &serde_json::Value) -> CycleOutcome {
        let mut fetched = 0;
        let merge = self
            .accumulator
            .merge(normalize(payload).inspect(|_| fetched += 1));

        log::info!("Fetched: {fetched} | {merge}");

        let saved = self.persist().await;
        CycleOutcome::Completed {
            fetched,
            merge,
            saved,
        }
    }

    /// Saves the whole master collection. Failures are logged and the
    /// in-memory collection stays authoritative.
    pub async fn persist(&self) -> bool {
        match self.backend.save(self.accumulator.incidents()).await {
            Ok(()) => true,
            Err(e) => {
                log::error!(
                    "Failed to save {} incidents to {}: {e}",
                    self.accumulator.len(),
                    self.backend.name()
                );
                false
            }
        }
    }

    /// Runs a single cycle, persists even if the fetch failed, logs
    /// statistics, and hands back the master collection.
    pub async fn run_once(mut self) -> Accumulator {
        if self.run_cycle().await == CycleOutcome::FetchFailed {
            self.persist().await;
        }
        log_statistics(&self.accumulator.statistics());

        self.accumulator
    }

    /// Polls until `shutdown` resolves, then persists a final time, logs
    /// closing statistics, and hands back the master collection.
    pub async fn run<S>(mut self, shutdown: S) -> Accumulator
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let fetched = tokio::select! {
                () = &mut shutdown => break,
                result = self.fetch() => result,
            };

            match fetched {
                Ok(payload) => {
                    self.ingest(&payload).await;
                }
                Err(e) => log::warn!("Fetch failed, skipping cycle: {e}"),
            }

            log::debug!("Next fetch in {}s", self.interval.as_secs());
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        log::info!("Shutting down, saving {} incidents", self.accumulator.len());
        self.persist().await;
        log_statistics(&self.accumulator.statistics());

        self.accumulator
    }
}

/// Logs a human-readable summary of `stats`.
pub fn log_statistics(stats: &Stats) {
    log::info!("Total incidents: {}", stats.total);

    for (incident_type, count) in stats.types_by_count() {
        log::info!("  {incident_type}: {count}");
    }

    match &stats.date_range {
        Some(range) => log::info!("Date range: {} to {}", range.earliest, range.latest),
        None => log::info!("Date range: none"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use traffic_incidents_storage::{LocalFileBackend, LocalFileSettings};

    use super::*;

    /// Replays canned fetch results in order, then fails.
    struct StaticFeed {
        responses: Mutex<VecDeque<Result<Value, SourceError>>>,
    }

    impl StaticFeed {
        fn new(responses: Vec<Result<Value, SourceError>>) -> Box<Self> {
            Box::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl IncidentFeed for StaticFeed {
        fn describe(&self) -> &str {
            "static"
        }

        async fn fetch(&self) -> Result<Value, SourceError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(SourceError::Exhausted {
                        message: "no more responses".to_string(),
                    })
                })
        }
    }

    fn unavailable() -> SourceError {
        SourceError::Status {
            status: 503,
            url: "http://feed.test/alerts".to_string(),
        }
    }

    fn settings_in(dir: &Path) -> LocalFileSettings {
        LocalFileSettings {
            master_path: dir.join("incidents_master.json"),
            latest_path: dir.join("incidents_latest.json"),
        }
    }

    fn fresh_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("traffic_incidents_poller_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn five_alerts() -> Value {
        json!({"alerts": [
            {"uuid": "a-1", "type": "ACCIDENT", "location": {"x": -73.98, "y": 40.75}, "pubMillis": 1_700_000_000_000_i64},
            {"uuid": "a-2", "type": "JAM", "location": {"x": -73.99, "y": 40.76}, "pubMillis": 1_700_000_060_000_i64},
            {"uuid": "a-3", "type": "HAZARD", "lat": 40.77, "lng": -74.0, "pubMillis": 1_700_000_120_000_i64},
            {"uuid": "a-2", "type": "JAM", "location": {"x": -73.9, "y": 40.8}, "pubMillis": 1_700_000_180_000_i64},
            {"type": "ROAD_CLOSED", "coordinates": [-74.01, 40.78], "pubMillis": 1_700_000_240}
        ]})
    }

    #[tokio::test]
    async fn cycle_normalizes_merges_and_saves() {
        let dir = fresh_dir("cycle");
        let settings = settings_in(&dir);

        let mut poller = Poller::start(
            StaticFeed::new(vec![Ok(five_alerts())]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(60),
        )
        .await;

        let outcome = poller.run_cycle().await;
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                fetched: 5,
                merge: MergeResult {
                    total: 4,
                    new: 4,
                    duplicates: 1,
                },
                saved: true,
            }
        );
        assert!(settings.master_path.exists());
        assert!(settings.latest_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unlocatable_alert_is_not_counted() {
        let dir = fresh_dir("unlocatable");
        let mut payload = five_alerts();
        payload["alerts"]
            .as_array_mut()
            .unwrap()
            .insert(2, json!({"uuid": "a-9", "type": "JAM", "street": "Nowhere"}));

        let mut poller = Poller::start(
            StaticFeed::new(vec![Ok(payload)]),
            Box::new(LocalFileBackend::new(&settings_in(&dir))),
            Duration::from_secs(60),
        )
        .await;

        let CycleOutcome::Completed { fetched, merge, .. } = poller.run_cycle().await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(fetched, 5);
        assert_eq!(
            merge,
            MergeResult {
                total: 4,
                new: 4,
                duplicates: 1,
            }
        );
        assert!(
            poller
                .accumulator()
                .incidents()
                .iter()
                .all(|i| i.uuid.as_deref() != Some("a-9"))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn once_persists_even_when_fetch_fails() {
        let dir = fresh_dir("once_failed");
        let settings = settings_in(&dir);

        let poller = Poller::start(
            StaticFeed::new(vec![Err(unavailable())]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(60),
        )
        .await;

        let accumulator = poller.run_once().await;

        assert!(accumulator.is_empty());
        assert_eq!(
            std::fs::read_to_string(&settings.master_path).unwrap().trim(),
            "[]"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_fetch_skips_merge_and_save() {
        let dir = fresh_dir("fetch_failed");
        let settings = settings_in(&dir);

        let mut poller = Poller::start(
            StaticFeed::new(vec![Err(unavailable())]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(poller.run_cycle().await, CycleOutcome::FetchFailed);
        assert!(poller.accumulator().is_empty());
        assert!(!settings.master_path.exists());
    }

    #[tokio::test]
    async fn corrupt_master_file_starts_empty() {
        let dir = fresh_dir("corrupt");
        let settings = settings_in(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&settings.master_path, "{not json").unwrap();

        let poller = Poller::start(
            StaticFeed::new(vec![]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(poller.accumulator().statistics().total, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn restart_resumes_from_persisted_collection() {
        let dir = fresh_dir("restart");
        let settings = settings_in(&dir);

        let mut first = Poller::start(
            StaticFeed::new(vec![Ok(five_alerts())]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(60),
        )
        .await;
        first.run_cycle().await;

        let mut second = Poller::start(
            StaticFeed::new(vec![Ok(five_alerts())]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(60),
        )
        .await;
        assert_eq!(second.accumulator().len(), 4);

        let CycleOutcome::Completed { merge, .. } = second.run_cycle().await else {
            panic!("expected a completed cycle");
        };
        assert_eq!(merge.new, 0);
        assert_eq!(merge.duplicates, 5);
        assert_eq!(merge.total, 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn run_fetches_immediately_and_persists_on_shutdown() {
        let dir = fresh_dir("run");
        let settings = settings_in(&dir);

        let poller = Poller::start(
            StaticFeed::new(vec![Ok(five_alerts()), Err(unavailable())]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(3600),
        )
        .await;

        let accumulator = poller
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert_eq!(accumulator.len(), 4);
        let saved = std::fs::read_to_string(&settings.master_path).unwrap();
        let saved: Vec<Value> = serde_json::from_str(&saved).unwrap();
        assert_eq!(saved.len(), 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn shutdown_before_first_fetch_still_persists() {
        let dir = fresh_dir("early_shutdown");
        let settings = settings_in(&dir);

        let poller = Poller::start(
            StaticFeed::new(vec![]),
            Box::new(LocalFileBackend::new(&settings)),
            Duration::from_secs(3600),
        )
        .await;

        let accumulator = poller.run(std::future::ready(())).await;

        assert!(accumulator.is_empty());
        assert_eq!(
            std::fs::read_to_string(&settings.master_path).unwrap().trim(),
            "[]"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
