use super::processor::SeriesJobProcessor;
use super::retry_policy::RetryPolicy;
use crate::config::WorkerSettings;
use crate::job_queue::JobQueueStore;
use crate::metrics;
use crate::occurrence_store::OccurrenceStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Marks a tick as in flight for as long as it is alive.
///
/// Only one lease over a given flag can exist at a time. Dropping the lease
/// clears the flag, including while unwinding from a panic.
#[derive(Debug)]
pub struct TickLease {
    flag: Arc<AtomicBool>,
}

impl TickLease {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for TickLease {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still in flight.
    Skipped,
    /// Nothing was eligible.
    Idle,
    /// This many jobs were claimed and processed.
    Processed(usize),
    Failed(String),
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Skipped => "skipped",
            TickOutcome::Idle => "idle",
            TickOutcome::Processed(_) => "processed",
            TickOutcome::Failed(_) => "error",
        }
    }
}

/// Drives the processor on a fixed interval, never running two ticks at once.
pub struct WorkerLoop {
    processor: SeriesJobProcessor,
    settings: WorkerSettings,
    in_flight: Arc<AtomicBool>,
}

impl WorkerLoop {
    pub fn new(
        jobs: Arc<dyn JobQueueStore>,
        occurrences: Arc<dyn OccurrenceStore>,
        settings: WorkerSettings,
    ) -> Self {
        let processor = SeriesJobProcessor::new(jobs, occurrences, RetryPolicy::new(&settings));
        Self {
            processor,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a tick currently holds the lease.
    pub fn is_tick_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a single tick on the current thread.
    ///
    /// Blocks while jobs are processed. Errors are logged and reported in the
    /// outcome, never returned.
    pub fn tick(&self) -> TickOutcome {
        let Some(_lease) = TickLease::try_acquire(&self.in_flight) else {
            warn!("Previous tick still in flight, skipping this one");
            metrics::record_tick(TickOutcome::Skipped.label());
            return TickOutcome::Skipped;
        };

        let outcome = match self.processor.run_batch(self.settings.batch_limit) {
            Ok(processed) if processed.is_empty() => {
                debug!("No eligible jobs");
                TickOutcome::Idle
            }
            Ok(processed) => {
                info!("Tick processed {} job(s)", processed.len());
                TickOutcome::Processed(processed.len())
            }
            Err(e) => {
                error!("Tick failed: {:#}", e);
                TickOutcome::Failed(format!("{:#}", e))
            }
        };
        metrics::record_tick(outcome.label());
        outcome
    }

    /// Put back jobs left `running` by a previous process.
    pub fn recover_stale_jobs(&self) -> Result<usize> {
        let cutoff = i64::try_from(self.settings.stale_running_threshold_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .and_then(|threshold| Utc::now().checked_sub_signed(threshold))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.processor.jobs().requeue_stale_running(cutoff)
    }

    /// Tick every `tick_interval_ms` until `shutdown` is cancelled.
    ///
    /// Each tick runs on the blocking pool. A tick that fires while the
    /// previous one is still running is skipped, not queued. On shutdown the
    /// loop stops firing and waits for the tick in flight to finish.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            "Starting series worker: tick interval {}ms, batch limit {}, max attempts {}",
            self.settings.tick_interval_ms, self.settings.batch_limit, self.settings.max_attempts
        );

        match self.recover_stale_jobs() {
            Ok(count) if count > 0 => {
                info!("Requeued {} stale running jobs from a previous run", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to requeue stale jobs: {:#}", e);
            }
        }

        let mut interval = tokio::time::interval(self.settings.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    while let Some(joined) = ticks.try_join_next() {
                        log_join_error(joined);
                    }
                    let worker = Arc::clone(&self);
                    ticks.spawn_blocking(move || worker.tick());
                }
                _ = shutdown.cancelled() => {
                    info!("Series worker received shutdown signal");
                    break;
                }
            }
        }

        while let Some(joined) = ticks.join_next().await {
            log_join_error(joined);
        }
        info!("Series worker stopped");
    }
}

fn log_join_error(joined: Result<TickOutcome, tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!("Tick task panicked: {}", e);
        metrics::record_tick(TickOutcome::Failed(String::new()).label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_queue::{
        ExpandSeriesPayload, Job, JobStatus, MockJobQueueStore, SqliteJobQueueStore,
    };
    use crate::occurrence_store::{MockOccurrenceStore, Occurrence, SqliteOccurrenceStore};
    use chrono::NaiveDate;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            tick_interval_ms: 10,
            ..Default::default()
        }
    }

    fn base_event() -> Occurrence {
        let day = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        Occurrence {
            id: "base".to_string(),
            title: "Match".to_string(),
            description: None,
            date: day,
            start_time: day.and_hms_opt(10, 0, 0).unwrap().and_utc(),
            end_time: day.and_hms_opt(12, 0, 0).unwrap().and_utc(),
            event_type: "match".to_string(),
            team: None,
            club: None,
            created_by: "admin".to_string(),
            repeats: Some("Weekly".to_string()),
            status: "scheduled".to_string(),
            series_id: None,
            occurrence_index: None,
        }
    }

    fn weekly_job() -> Job {
        let payload = ExpandSeriesPayload {
            series_id: "series-w".to_string(),
            base_event_id: "base".to_string(),
            repeats: "Weekly".to_string(),
            until: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
        };
        Job::expand_series(&payload, Utc::now() - chrono::Duration::seconds(1)).unwrap()
    }

    fn sqlite_worker() -> (Arc<SqliteJobQueueStore>, Arc<SqliteOccurrenceStore>, WorkerLoop) {
        let jobs = Arc::new(SqliteJobQueueStore::in_memory().unwrap());
        let occurrences = Arc::new(SqliteOccurrenceStore::in_memory().unwrap());
        let worker = WorkerLoop::new(jobs.clone(), occurrences.clone(), settings());
        (jobs, occurrences, worker)
    }

    #[test]
    fn test_lease_is_exclusive_and_released_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));

        let lease = TickLease::try_acquire(&flag).unwrap();
        assert!(flag.load(Ordering::Acquire));
        assert!(TickLease::try_acquire(&flag).is_none());

        drop(lease);
        assert!(!flag.load(Ordering::Acquire));
        assert!(TickLease::try_acquire(&flag).is_some());
    }

    #[test]
    fn test_lease_released_on_panic() {
        let flag = Arc::new(AtomicBool::new(false));
        let panicking = Arc::clone(&flag);

        let result = thread::spawn(move || {
            let _lease = TickLease::try_acquire(&panicking).unwrap();
            panic!("tick blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_tick_idle_then_processed() {
        let (jobs, occurrences, worker) = sqlite_worker();
        assert_eq!(worker.tick(), TickOutcome::Idle);

        occurrences.insert(&base_event()).unwrap();
        let job = weekly_job();
        jobs.enqueue(&job).unwrap();

        assert_eq!(worker.tick(), TickOutcome::Processed(1));
        assert_eq!(jobs.get_job(&job.id).unwrap().unwrap().status, JobStatus::Done);
        assert_eq!(occurrences.count_series("series-w").unwrap(), 4);
        assert!(!worker.is_tick_in_flight());
    }

    #[test]
    fn test_tick_skipped_while_lease_held() {
        let (jobs, occurrences, worker) = sqlite_worker();
        occurrences.insert(&base_event()).unwrap();
        let job = weekly_job();
        jobs.enqueue(&job).unwrap();

        let lease = TickLease::try_acquire(&worker.in_flight).unwrap();
        assert_eq!(worker.tick(), TickOutcome::Skipped);
        assert_eq!(
            jobs.get_job(&job.id).unwrap().unwrap().status,
            JobStatus::Queued
        );

        drop(lease);
        assert_eq!(worker.tick(), TickOutcome::Processed(1));
    }

    #[test]
    fn test_overlapping_ticks_claim_once() {
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);

        let mut jobs = MockJobQueueStore::new();
        jobs.expect_claim_next_job().times(1).returning(move |_| {
            entered_tx.lock().unwrap().send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
            Ok(None)
        });

        let worker = Arc::new(WorkerLoop::new(
            Arc::new(jobs),
            Arc::new(MockOccurrenceStore::new()),
            settings(),
        ));

        let first = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.tick())
        };
        entered_rx.recv().unwrap();

        assert!(worker.is_tick_in_flight());
        assert_eq!(worker.tick(), TickOutcome::Skipped);

        release_tx.send(()).unwrap();
        assert_eq!(first.join().unwrap(), TickOutcome::Idle);
        assert!(!worker.is_tick_in_flight());
    }

    #[test]
    fn test_tick_reports_claim_errors() {
        let mut jobs = MockJobQueueStore::new();
        jobs.expect_claim_next_job()
            .returning(|_| Err(anyhow::anyhow!("disk I/O error")));

        let worker = WorkerLoop::new(
            Arc::new(jobs),
            Arc::new(MockOccurrenceStore::new()),
            settings(),
        );

        match worker.tick() {
            TickOutcome::Failed(message) => assert!(message.contains("disk I/O error")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!worker.is_tick_in_flight());
    }

    #[test]
    fn test_recover_stale_jobs_uses_threshold() {
        let mut jobs = MockJobQueueStore::new();
        let before = Utc::now();
        jobs.expect_requeue_stale_running()
            .withf(move |cutoff| {
                *cutoff <= before - chrono::Duration::seconds(3600) + chrono::Duration::seconds(5)
                    && *cutoff >= before - chrono::Duration::seconds(3600)
            })
            .times(1)
            .returning(|_| Ok(2));

        let worker = WorkerLoop::new(
            Arc::new(jobs),
            Arc::new(MockOccurrenceStore::new()),
            settings(),
        );
        assert_eq!(worker.recover_stale_jobs().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_processes_jobs_until_shutdown() {
        let (jobs, occurrences, worker) = sqlite_worker();
        occurrences.insert(&base_event()).unwrap();
        let job = weekly_job();
        jobs.enqueue(&job).unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(worker).run(shutdown.clone()));

        let mut done = false;
        for _ in 0..200 {
            if jobs.get_job(&job.id).unwrap().unwrap().status == JobStatus::Done {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(done, "job was not processed");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert_eq!(occurrences.count_series("series-w").unwrap(), 4);
    }
}
