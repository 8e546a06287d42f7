//! Scheduler - fires the release and certificate jobs on their own intervals.
//!
//! A single dispatch loop wakes every `tick`, runs each due job to
//! completion in table order, and reschedules it one interval after it
//! finished. Jobs therefore never overlap. A failed job is logged and
//! retried when it is next due; a fatal error stops the loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::BoxFuture;

/// The scheduled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ReleaseCheck,
    TlsCheck,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::ReleaseCheck => "release-check",
            JobKind::TlsCheck => "tls-check",
        })
    }
}

/// Executes one run of a job.
pub trait JobRunner: Send + Sync {
    fn run_job(&self, kind: JobKind) -> BoxFuture<'_, MonitorResult<()>>;
}

/// Intervals and polling cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub release_interval: Duration,
    pub tls_interval: Duration,
    pub tick: Duration,
    /// Run every job once immediately instead of one interval after start.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            release_interval: Duration::from_secs(60 * 60),
            tls_interval: Duration::from_secs(2 * 60 * 60),
            tick: Duration::from_secs(5),
            run_on_start: false,
        }
    }
}

impl SchedulerConfig {
    /// Short intervals for debugging against a live fleet.
    pub fn debug() -> Self {
        Self {
            release_interval: Duration::from_secs(10),
            tls_interval: Duration::from_secs(30),
            ..Self::default()
        }
    }
}

struct JobSlot {
    kind: JobKind,
    interval: Duration,
    next_due: Instant,
    runs: u64,
}

/// Owns the job table; construct once and either [`run`](Self::run) it in
/// place or [`start`](Self::start) it on its own task.
pub struct Scheduler {
    runner: Arc<dyn JobRunner>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn JobRunner>, config: SchedulerConfig) -> Self {
        Self { runner, config }
    }

    /// Spawn the dispatch loop.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            shutdown_tx,
            handle,
        }
    }

    /// Run until `shutdown` flips to true, its sender is dropped, or a job
    /// fails fatally.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> MonitorResult<()> {
        let start = Instant::now();
        let first_due = |interval: Duration| {
            if self.config.run_on_start {
                start
            } else {
                start + interval
            }
        };
        let mut jobs = vec![
            JobSlot {
                kind: JobKind::ReleaseCheck,
                interval: self.config.release_interval,
                next_due: first_due(self.config.release_interval),
                runs: 0,
            },
            JobSlot {
                kind: JobKind::TlsCheck,
                interval: self.config.tls_interval,
                next_due: first_due(self.config.tls_interval),
                runs: 0,
            },
        ];

        info!(
            release_interval = ?self.config.release_interval,
            tls_interval = ?self.config.tls_interval,
            tick = ?self.config.tick,
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            for slot in jobs.iter_mut() {
                if Instant::now() < slot.next_due {
                    continue;
                }
                slot.runs += 1;
                debug!(job = %slot.kind, run = slot.runs, "job starting");
                match self.runner.run_job(slot.kind).await {
                    Ok(()) => debug!(job = %slot.kind, "job finished"),
                    Err(e) if e.is_fatal() => {
                        error!(job = %slot.kind, error = %e, "job failed fatally, stopping scheduler");
                        return Err(e);
                    }
                    Err(e) => warn!(job = %slot.kind, error = %e, "job failed"),
                }
                slot.next_due = Instant::now() + slot.interval;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        debug!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("scheduler stopped");
        Ok(())
    }
}

/// Handle to a spawned scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<MonitorResult<()>>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the running job (if any) to finish.
    pub async fn stop(self) -> MonitorResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.join().await
    }

    /// Wait for the loop to exit on its own (fatal error).
    pub async fn join(self) -> MonitorResult<()> {
        joined(self.handle.await)
    }

    /// Stop once `signal` resolves and return its output. Returns `None`
    /// if the loop exited first.
    pub async fn stop_on<T>(mut self, signal: impl Future<Output = T>) -> MonitorResult<Option<T>> {
        let output = tokio::select! {
            res = &mut self.handle => {
                joined(res)?;
                return Ok(None);
            }
            output = signal => output,
        };
        self.stop().await?;
        Ok(Some(output))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn joined(res: Result<MonitorResult<()>, tokio::task::JoinError>) -> MonitorResult<()> {
    res.map_err(|e| MonitorError::Worker {
        domain: "scheduler".to_string(),
        message: e.to_string(),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tootwatch_state::StateError;

    #[derive(Default)]
    struct CountingRunner {
        runs: Mutex<Vec<(JobKind, Instant)>>,
        in_flight: AtomicUsize,
        overlapped: AtomicUsize,
        job_time: Option<Duration>,
        /// `Some(fatal)` makes every run fail.
        failure: Option<bool>,
    }

    impl CountingRunner {
        fn count(&self, kind: JobKind) -> usize {
            self.runs.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
        }
    }

    impl JobRunner for CountingRunner {
        fn run_job(&self, kind: JobKind) -> BoxFuture<'_, MonitorResult<()>> {
            Box::pin(async move {
                if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    self.overlapped.fetch_add(1, Ordering::SeqCst);
                }
                self.runs.lock().unwrap().push((kind, Instant::now()));
                if let Some(job_time) = self.job_time {
                    tokio::time::sleep(job_time).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                match self.failure {
                    Some(true) => Err(MonitorError::State(StateError::Open("disk gone".into()))),
                    Some(false) => Err(MonitorError::EmptyFeed),
                    None => Ok(()),
                }
            })
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            release_interval: Duration::from_secs(10),
            tls_interval: Duration::from_secs(30),
            tick: Duration::from_secs(1),
            run_on_start: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_fire_on_their_own_intervals() {
        let runner = Arc::new(CountingRunner::default());
        let handle = Scheduler::new(runner.clone(), config()).start();

        tokio::time::sleep(Duration::from_secs(65)).await;
        handle.stop().await.unwrap();

        assert_eq!(runner.count(JobKind::ReleaseCheck), 6);
        assert_eq!(runner.count(JobKind::TlsCheck), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_on_start_fires_immediately() {
        let runner = Arc::new(CountingRunner::default());
        let handle = Scheduler::new(
            runner.clone(),
            SchedulerConfig {
                run_on_start: true,
                ..config()
            },
        )
        .start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.stop().await.unwrap();

        assert_eq!(runner.count(JobKind::ReleaseCheck), 1);
        assert_eq!(runner.count(JobKind::TlsCheck), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_jobs_never_overlap() {
        let runner = Arc::new(CountingRunner {
            job_time: Some(Duration::from_secs(25)),
            ..Default::default()
        });
        let handle = Scheduler::new(runner.clone(), config()).start();

        tokio::time::sleep(Duration::from_secs(200)).await;
        handle.stop().await.unwrap();

        assert_eq!(runner.overlapped.load(Ordering::SeqCst), 0);
        let runs = runner.runs.lock().unwrap();
        assert!(runs.len() >= 4);
        for pair in runs.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(25));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_keep_the_loop_alive() {
        let runner = Arc::new(CountingRunner {
            failure: Some(false),
            ..Default::default()
        });
        let handle = Scheduler::new(runner.clone(), config()).start();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(!handle.is_finished());
        handle.stop().await.unwrap();

        assert_eq!(runner.count(JobKind::ReleaseCheck), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_stops_the_loop() {
        let runner = Arc::new(CountingRunner {
            failure: Some(true),
            ..Default::default()
        });
        let handle = Scheduler::new(runner.clone(), config()).start();

        let result = handle.join().await;
        assert!(matches!(result, Err(MonitorError::State(_))));
        assert_eq!(runner.count(JobKind::ReleaseCheck), 1);
        assert_eq!(runner.count(JobKind::TlsCheck), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_ends_the_loop() {
        let runner = Arc::new(CountingRunner::default());
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let scheduler = Scheduler::new(
            runner.clone(),
            SchedulerConfig {
                release_interval: Duration::from_millis(10),
                tls_interval: Duration::from_millis(10),
                tick: Duration::from_secs(1),
                run_on_start: true,
            },
        );
        tokio::time::timeout(Duration::from_millis(300), scheduler.run(rx))
            .await
            .expect("loop should exit once the sender is gone")
            .unwrap();

        assert_eq!(runner.count(JobKind::ReleaseCheck), 1);
        assert_eq!(runner.count(JobKind::TlsCheck), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_on_stops_when_the_signal_fires() {
        let runner = Arc::new(CountingRunner::default());
        let handle = Scheduler::new(runner.clone(), config()).start();

        let signal = async {
            tokio::time::sleep(Duration::from_secs(25)).await;
            "interrupt"
        };
        assert_eq!(handle.stop_on(signal).await.unwrap(), Some("interrupt"));
        assert_eq!(runner.count(JobKind::ReleaseCheck), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_on_returns_when_the_loop_exits_first() {
        let runner = Arc::new(CountingRunner {
            failure: Some(true),
            ..Default::default()
        });
        let handle = Scheduler::new(runner, config()).start();

        let result = handle.stop_on(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(MonitorError::State(_))));
    }

    #[test]
    fn debug_config_shortens_intervals() {
        let debug = SchedulerConfig::debug();
        assert_eq!(debug.release_interval, Duration::from_secs(10));
        assert_eq!(debug.tls_interval, Duration::from_secs(30));
        assert_eq!(debug.tick, SchedulerConfig::default().tick);
    }
}
