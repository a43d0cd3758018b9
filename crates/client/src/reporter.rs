//! Progress and result reporting from inside a running render.
//!
//! Every push retries transient store failures. Progress pushes use a short
//! budget ([`RetryConfig::progress_push`]) since the next push carries
//! fresher data; terminal pushes use the caller's longer one, as losing one
//! leaves the job `in_progress` until the worker's own finalization.

use std::sync::Arc;

use renderfarm_core::backoff::RetryConfig;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::status_update::{clamp_progress, TIME_ESTIMATE_DONE, TIME_ESTIMATE_UNKNOWN};
use renderfarm_core::types::JobUid;
use renderfarm_db::models::render_job::JobUpdate;
use renderfarm_db::store::JobStore;

use crate::error::ClientError;
use crate::retry::retry_transient;

/// Pushes status updates for one job.
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    uid: JobUid,
    retry: RetryConfig,
    progress_retry: RetryConfig,
}

impl ProgressReporter {
    /// `retry` governs the terminal pushes.
    pub fn new(store: Arc<dyn JobStore>, uid: JobUid, retry: RetryConfig) -> Self {
        Self {
            store,
            uid,
            retry,
            progress_retry: RetryConfig::progress_push(),
        }
    }

    pub fn progress_retry(mut self, retry: RetryConfig) -> Self {
        self.progress_retry = retry;
        self
    }

    pub fn uid(&self) -> JobUid {
        self.uid
    }

    /// Push live progress. Returns whether the job was still `in_progress`.
    ///
    /// `percent` is clamped into `0..=100`; an empty estimate is recorded
    /// as `"unknown"`.
    pub async fn report_progress(
        &self,
        percent: f64,
        time_estimate: &str,
    ) -> Result<bool, ClientError> {
        let estimate = match time_estimate.trim() {
            "" => TIME_ESTIMATE_UNKNOWN,
            other => other,
        };
        let update = JobUpdate::progress(clamp_progress(percent), estimate);

        let applied = retry_transient(&self.progress_retry, "report_progress", || {
            self.store.compare_and_transition(
                self.uid,
                RenderStatus::InProgress,
                RenderStatus::InProgress,
                &update,
            )
        })
        .await?;

        if !applied {
            tracing::debug!(uid = %self.uid, "Progress push ignored, job no longer in progress");
        }
        Ok(applied)
    }

    /// Mark the job `finished` with progress 100.
    pub async fn report_finished(&self) -> Result<bool, ClientError> {
        let applied = self
            .push_terminal(
                RenderStatus::Finished,
                JobUpdate::progress(100.0, TIME_ESTIMATE_DONE),
                "report_finished",
            )
            .await?;
        if applied {
            tracing::info!(uid = %self.uid, "Render job finished");
        }
        Ok(applied)
    }

    /// Mark the job `error` with a diagnostic.
    pub async fn report_failed(&self, message: &str) -> Result<bool, ClientError> {
        let applied = self
            .push_terminal(
                RenderStatus::Error,
                JobUpdate::failure(message),
                "report_failed",
            )
            .await?;
        if applied {
            tracing::warn!(uid = %self.uid, message, "Render job failed");
        }
        Ok(applied)
    }

    async fn push_terminal(
        &self,
        status: RenderStatus,
        update: JobUpdate,
        operation: &'static str,
    ) -> Result<bool, ClientError> {
        let applied = retry_transient(&self.retry, operation, || {
            self.store
                .compare_and_transition(self.uid, RenderStatus::InProgress, status, &update)
        })
        .await?;

        if !applied {
            tracing::warn!(
                uid = %self.uid,
                status = %status,
                "Terminal push rejected, job no longer in progress",
            );
        }
        Ok(applied)
    }
}
