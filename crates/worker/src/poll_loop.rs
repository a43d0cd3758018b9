//! The worker's scan / claim / execute / finalize cycle.

use std::sync::Arc;
use std::time::Duration;

use renderfarm_client::error::ClientError;
use renderfarm_client::retry::retry_transient;
use renderfarm_core::backoff::RetryConfig;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::JobUid;
use renderfarm_db::models::render_job::{JobUpdate, RenderJob, RenderJobFilter};
use renderfarm_db::store::{JobStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::config::{ClaimOrder, WorkerConfig};
use crate::runner::{TaskOutcome, TaskRunner};

/// Claims lost to other workers before an iteration gives up.
pub const MAX_CLAIM_ATTEMPTS: u32 = 3;

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing claimable for this worker.
    Idle,
    /// Every claim attempt lost the race.
    Conflict,
    /// A job was claimed and its task has ended.
    Completed { uid: JobUid, outcome: TaskOutcome },
    /// The store could not be scanned or claimed against.
    StoreUnavailable,
}

/// Polls the store for jobs assigned to one worker and runs them one at a
/// time.
pub struct WorkerLoop {
    worker: String,
    store: Arc<dyn JobStore>,
    runner: Arc<dyn TaskRunner>,
    poll_interval: Duration,
    render_timeout: Duration,
    claim_order: ClaimOrder,
    finalize_retry: RetryConfig,
}

impl WorkerLoop {
    pub fn new(
        worker: impl Into<String>,
        store: Arc<dyn JobStore>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            worker: worker.into(),
            store,
            runner,
            poll_interval: Duration::from_secs(10),
            render_timeout: Duration::from_secs(4 * 60 * 60),
            claim_order: ClaimOrder::default(),
            finalize_retry: RetryConfig::default(),
        }
    }

    pub fn from_config(
        config: &WorkerConfig,
        store: Arc<dyn JobStore>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self::new(config.worker_name.clone(), store, runner)
            .poll_interval(config.poll_interval)
            .render_timeout(config.render_timeout)
            .claim_order(config.claim_order)
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn claim_order(mut self, order: ClaimOrder) -> Self {
        self.claim_order = order;
        self
    }

    /// Backoff for the `in_progress -> error` write after a task ends.
    pub fn finalize_retry(mut self, retry: RetryConfig) -> Self {
        self.finalize_retry = retry;
        self
    }

    /// Run iterations until `cancel` fires, sleeping `poll_interval` after
    /// each one.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker = %self.worker,
            poll_interval_secs = self.poll_interval.as_secs(),
            "Worker loop started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.tick(&cancel).await {
                TickOutcome::Idle => tracing::trace!(worker = %self.worker, "No claimable jobs"),
                TickOutcome::Conflict => {
                    tracing::debug!(worker = %self.worker, "Lost every claim this iteration")
                }
                TickOutcome::Completed { uid, outcome } => tracing::info!(
                    worker = %self.worker,
                    uid = %uid,
                    outcome = ?outcome,
                    "Iteration complete",
                ),
                TickOutcome::StoreUnavailable => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!(worker = %self.worker, "Worker loop cancelled");
    }

    /// One scan / claim / execute / finalize pass.
    pub async fn tick(&self, cancel: &CancellationToken) -> TickOutcome {
        let mut conflicted = false;

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            let candidates = match self.scan().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(worker = %self.worker, error = %e, "Scan failed");
                    return TickOutcome::StoreUnavailable;
                }
            };

            let Some(job) = candidates.into_iter().next() else {
                return if conflicted {
                    TickOutcome::Conflict
                } else {
                    TickOutcome::Idle
                };
            };

            match self
                .store
                .compare_and_transition(
                    job.uid,
                    RenderStatus::ReadyToStart,
                    RenderStatus::InProgress,
                    &JobUpdate::default(),
                )
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        worker = %self.worker,
                        uid = %job.uid,
                        name = %job.name,
                        "Claimed render job",
                    );
                    let outcome = self.execute(&job, cancel).await;
                    return TickOutcome::Completed {
                        uid: job.uid,
                        outcome,
                    };
                }
                Ok(false) => {
                    tracing::debug!(
                        worker = %self.worker,
                        uid = %job.uid,
                        attempt,
                        "Claim conflict",
                    );
                    conflicted = true;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(worker = %self.worker, uid = %job.uid, error = %e, "Claim failed");
                    return TickOutcome::StoreUnavailable;
                }
                Err(e) => {
                    tracing::error!(worker = %self.worker, uid = %job.uid, error = %e, "Claim rejected");
                    conflicted = true;
                }
            }
        }

        TickOutcome::Conflict
    }

    /// Claimable jobs for this worker, preferred first.
    async fn scan(&self) -> Result<Vec<RenderJob>, StoreError> {
        let filter = RenderJobFilter::claimable_by(&self.worker);
        let mut jobs = self.store.list(&filter).await?;
        jobs.retain(|job| filter.matches(job));
        self.claim_order.sort(&mut jobs);
        Ok(jobs)
    }

    /// Run the task under the render timeout, then finalize the record.
    ///
    /// On timeout the record is errored before the engine is told to stop,
    /// so nothing the engine pushes while shutting down can land.
    async fn execute(&self, job: &RenderJob, cancel: &CancellationToken) -> TaskOutcome {
        let stop = cancel.child_token();
        let mut run = self.runner.run(job, stop.clone());

        let outcome = tokio::select! {
            outcome = &mut run => return self.finalize(job.uid, outcome).await,
            () = tokio::time::sleep(self.render_timeout) => TaskOutcome::TimedOut {
                after: self.render_timeout,
            },
        };

        tracing::warn!(
            worker = %self.worker,
            uid = %job.uid,
            timeout_secs = self.render_timeout.as_secs(),
            "Render timed out",
        );
        let outcome = self.finalize(job.uid, outcome).await;
        stop.cancel();
        run.await;
        outcome
    }

    /// Move a still-`in_progress` job to `error` with the outcome's
    /// diagnostic. A task that already reported its own result wins the
    /// guard and the write is a no-op.
    async fn finalize(&self, uid: JobUid, outcome: TaskOutcome) -> TaskOutcome {
        let clean_exit = outcome == TaskOutcome::Exited;
        let failure = if clean_exit {
            TaskOutcome::ExitedWithoutReport
        } else {
            outcome
        };
        let message = failure.diagnostic().unwrap_or_default();
        let update = JobUpdate::failure(message.as_str());

        let result = retry_transient(&self.finalize_retry, "finalize", || {
            self.store.compare_and_transition(
                uid,
                RenderStatus::InProgress,
                RenderStatus::Error,
                &update,
            )
        })
        .await;

        match result {
            Ok(true) => {
                tracing::warn!(
                    worker = %self.worker,
                    uid = %uid,
                    error = %message,
                    "Render job marked as error",
                );
                failure
            }
            Ok(false) if clean_exit => TaskOutcome::Exited,
            Ok(false) => {
                tracing::debug!(uid = %uid, "Job already left in_progress");
                failure
            }
            Err(ClientError::RetriesExhausted { attempts, last, .. }) => {
                tracing::error!(
                    worker = %self.worker,
                    uid = %uid,
                    attempts,
                    error = %last,
                    diagnostic = %message,
                    "Could not finalize job, it stays in_progress",
                );
                failure
            }
            Err(e) => {
                tracing::error!(worker = %self.worker, uid = %uid, error = %e, "Finalize failed");
                failure
            }
        }
    }
}
