//! Periodic job scheduler
//!
//! Every job is its own tokio task. Jobs sit idle until `start()`, then run
//! every `interval` and whenever `run_now()` is called. `shutdown()` stops
//! every job from taking a new tick and waits for ticks already running.
//!
//! # Example
//! ```ignore
//! let scheduler = Scheduler::new("miner");
//! let id = scheduler.add_job("reconcile", Duration::from_secs(600), move || {
//!     Box::pin(async move { tracing::info!("tick") })
//! })?;
//! scheduler.start();
//! scheduler.run_now(id);
//! scheduler.shutdown(Duration::from_secs(30)).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler {0} is shut down")]
    Closed(String),

    #[error("Scheduler {name} did not stop within {timeout_ms}ms")]
    ShutdownTimeout { name: String, timeout_ms: u64 },
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Type-erased job body, invoked once per tick
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct JobHandle {
    name: String,
    cancel: CancellationToken,
    run_now: Arc<Notify>,
}

pub struct Scheduler {
    name: String,
    jobs: Mutex<HashMap<JobId, JobHandle>>,
    root: CancellationToken,
    tracker: TaskTracker,
    started: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Self {
        let (started, _) = watch::channel(false);
        Self {
            name: name.into(),
            jobs: Mutex::new(HashMap::new()),
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobHandle>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a periodic job. The first tick happens one `interval` after
    /// the scheduler is started, or earlier through `run_now`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_job<F>(&self, name: impl Into<String>, interval: Duration, task: F) -> SchedulerResult<JobId>
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        if self.root.is_cancelled() {
            return Err(SchedulerError::Closed(self.name.clone()));
        }

        let id = JobId(Uuid::new_v4());
        let name = name.into();
        let handle = JobHandle {
            name: name.clone(),
            cancel: self.root.child_token(),
            run_now: Arc::new(Notify::new()),
        };

        self.tracker.spawn(job_loop(
            name.clone(),
            interval,
            Arc::new(task),
            handle.cancel.clone(),
            handle.run_now.clone(),
            self.started.subscribe(),
        ));
        self.jobs().insert(id, handle);

        debug!(scheduler = %self.name, job = %name, job_id = %id, "Job added");
        Ok(id)
    }

    /// Stop a job from taking further ticks. A tick already running finishes.
    pub fn remove_job(&self, id: JobId) -> bool {
        match self.jobs().remove(&id) {
            Some(handle) => {
                handle.cancel.cancel();
                debug!(scheduler = %self.name, job = %handle.name, job_id = %id, "Job removed");
                true
            }
            None => false,
        }
    }

    /// Trigger an immediate tick. Before `start()` the tick is queued.
    pub fn run_now(&self, id: JobId) -> bool {
        match self.jobs().get(&id) {
            Some(handle) => {
                handle.run_now.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn run_all_now(&self) {
        for handle in self.jobs().values() {
            handle.run_now.notify_one();
        }
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs().contains_key(&id)
    }

    pub fn job_count(&self) -> usize {
        self.jobs().len()
    }

    pub fn start(&self) {
        self.started.send_replace(true);
        info!(scheduler = %self.name, jobs = self.job_count(), "Scheduler started");
    }

    #[cfg(test)]
    pub(crate) fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel all jobs and wait up to `timeout` for in-flight ticks
    pub async fn shutdown(&self, timeout: Duration) -> SchedulerResult<()> {
        self.root.cancel();
        self.tracker.close();
        self.jobs().clear();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!(scheduler = %self.name, "Scheduler stopped");
                Ok(())
            }
            Err(_) => {
                warn!(scheduler = %self.name, timeout_ms = timeout.as_millis() as u64, "Scheduler shutdown timed out");
                Err(SchedulerError::ShutdownTimeout {
                    name: self.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

async fn job_loop(
    name: String,
    interval: Duration,
    task: JobFn,
    cancel: CancellationToken,
    run_now: Arc<Notify>,
    mut started: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        result = async { started.wait_for(|s| *s).await.map(|_| ()) } => {
            if result.is_err() {
                return;
            }
        }
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = run_now.notified() => {}
            _ = ticker.tick() => {}
        }

        // A tick in progress is never interrupted
        if AssertUnwindSafe(task()).catch_unwind().await.is_err() {
            error!(job = %name, "Job panicked");
        }
    }
    debug!(job = %name, "Job loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>) -> impl Fn() -> BoxFuture<'static, ()> + Send + Sync {
        move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_jobs_wait_for_start() {
        let scheduler = Scheduler::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .add_job("job", Duration::from_secs(3600), counting_job(count.clone()))
            .unwrap();

        scheduler.run_now(id);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "no tick before start");

        scheduler.start();
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "queued run_now fires on start");
    }

    #[tokio::test]
    async fn test_periodic_ticks() {
        let scheduler = Scheduler::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_job("job", Duration::from_millis(20), counting_job(count.clone()))
            .unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(110)).await;
        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 3, "expected several ticks, got {}", ticks);
    }

    #[tokio::test]
    async fn test_run_now_triggers_immediate_tick() {
        let scheduler = Scheduler::new("test");
        scheduler.start();
        let count = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .add_job("job", Duration::from_secs(3600), counting_job(count.clone()))
            .unwrap();

        assert!(scheduler.run_now(id));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_job_stops_ticks() {
        let scheduler = Scheduler::new("test");
        scheduler.start();
        let count = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .add_job("job", Duration::from_millis(10), counting_job(count.clone()))
            .unwrap();

        assert!(scheduler.remove_job(id));
        assert!(!scheduler.remove_job(id));
        assert!(!scheduler.run_now(id));
        assert_eq!(scheduler.job_count(), 0);

        let before = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_tick() {
        let scheduler = Scheduler::new("test");
        scheduler.start();
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let id = scheduler
            .add_job("slow", Duration::from_secs(3600), move || {
                let f = f.clone();
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                })
            })
            .unwrap();

        scheduler.run_now(id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown(Duration::from_secs(2)).await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_reported() {
        let scheduler = Scheduler::new("stuck");
        scheduler.start();
        let id = scheduler
            .add_job("forever", Duration::from_secs(3600), || {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                })
            })
            .unwrap();
        scheduler.run_now(id);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = scheduler.shutdown(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ShutdownTimeout { .. }));
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_rejected() {
        let scheduler = Scheduler::new("test");
        scheduler.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(scheduler.is_shutdown());
        let err = scheduler
            .add_job("late", Duration::from_secs(1), || Box::pin(async {}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Scheduler test is shut down");
    }

    #[tokio::test]
    async fn test_panicking_job_keeps_running() {
        let scheduler = Scheduler::new("test");
        scheduler.start();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = scheduler
            .add_job("flaky", Duration::from_secs(3600), move || {
                let c = c.clone();
                Box::pin(async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first tick fails");
                    }
                })
            })
            .unwrap();

        scheduler.run_now(id);
        settle().await;
        scheduler.run_now(id);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
