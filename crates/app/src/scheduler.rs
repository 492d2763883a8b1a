//! Periodic job runner.
//!
//! Every job runs on its own tokio task, driven by an interval whose first
//! tick is one period after spawning. Late ticks are delayed, never bunched.
//! A `true` on the shutdown channel stops new ticks; a job already running
//! is allowed to finish.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use fieldhub_domain::error::FieldHubError;

/// How often a job runs and how it retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPolicy {
    pub period: Duration,
    /// Extra attempts after a failed run, within the same tick.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl JobPolicy {
    #[must_use]
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            max_retries: 0,
            retry_delay: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

/// Owns the tasks of every spawned job.
pub struct Scheduler {
    shutdown: watch::Receiver<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Create a scheduler that stops its jobs once `shutdown` turns `true`.
    #[must_use]
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Run `job` every `policy.period` until shutdown.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, policy: JobPolicy, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FieldHubError>> + Send + 'static,
    {
        let mut shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + policy.period, policy.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(job = name, period_secs = policy.period.as_secs(), "job scheduled");

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => {}
                }
                if *shutdown.borrow() || shutdown.has_changed().is_err() {
                    break;
                }
                run_with_retries(name, policy, &job, &mut shutdown).await;
            }
            tracing::debug!(job = name, "job stopped");
        });
        self.tasks.push((name, handle));
    }

    /// Wait for every job task to stop.
    ///
    /// Completes once `true` has been sent on the shutdown channel, or its
    /// sender dropped, and in-flight jobs have finished.
    pub async fn shutdown(self) {
        for (name, handle) in self.tasks {
            if let Err(err) = handle.await {
                tracing::error!(job = name, %err, "job task failed");
            }
        }
    }
}

async fn run_with_retries<F, Fut>(
    name: &'static str,
    policy: JobPolicy,
    job: &F,
    shutdown: &mut watch::Receiver<bool>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), FieldHubError>>,
{
    let mut attempt = 0;
    loop {
        match job().await {
            Ok(()) => return,
            Err(err) if attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(job = name, attempt, err = %err.describe(), "job failed, retrying");
                tokio::select! {
                    () = tokio::time::sleep(policy.retry_delay) => {}
                    _ = shutdown.changed() => return,
                }
            }
            Err(err) => {
                tracing::error!(job = name, err = %err.describe(), "job failed");
                return;
            }
        }
    }
}
