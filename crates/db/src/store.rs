//! The job store contract and its PostgreSQL implementation.
//!
//! `compare_and_transition` is the only primitive correctness depends on:
//! it succeeds iff the stored status equals `expected`, and concurrent calls
//! for the same uid never both succeed.

use async_trait::async_trait;
use renderfarm_core::error::CoreError;
use renderfarm_core::render_request::validate_worker_name;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::status_update::check_progress;
use renderfarm_core::types::JobUid;

use crate::models::render_job::{JobUpdate, NewRenderJob, RenderJob, RenderJobFilter};
use crate::repositories::RenderJobRepo;
use crate::DbPool;

/// Errors surfaced by any [`JobStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A job with this uid already exists.
    #[error("Duplicate key: render job {0} already exists")]
    DuplicateKey(JobUid),

    #[error("Render job {0} not found")]
    NotFound(JobUid),

    /// The requested edge is not part of the lifecycle graph.
    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition { from: RenderStatus, to: RenderStatus },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The store could not be reached. Callers may retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something this client does not understand.
    #[error("Unexpected store response: {0}")]
    Protocol(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => StoreError::Validation(msg),
            other => StoreError::Protocol(other.to_string()),
        }
    }
}

/// Durable, concurrently-accessed table of render job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `submitted` state.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if the uid is taken.
    async fn create(&self, job: NewRenderJob) -> Result<RenderJob, StoreError>;

    /// Fetch a single job.
    async fn get(&self, uid: JobUid) -> Result<RenderJob, StoreError>;

    /// Snapshot of the jobs matching `filter`, ordered by `created_at`
    /// then uid.
    async fn list(&self, filter: &RenderJobFilter) -> Result<Vec<RenderJob>, StoreError>;

    /// Atomically move `uid` from `expected` to `new`, applying `update`.
    ///
    /// Returns `Ok(false)` without changing anything when the current status
    /// is not `expected` (or a supplied worker conflicts with the assigned
    /// one). Unknown uids are [`StoreError::NotFound`]; edges outside the
    /// lifecycle graph are [`StoreError::InvalidTransition`].
    async fn compare_and_transition(
        &self,
        uid: JobUid,
        expected: RenderStatus,
        new: RenderStatus,
        update: &JobUpdate,
    ) -> Result<bool, StoreError>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Checks shared by every store before a transition touches any record.
pub fn validate_transition(
    expected: RenderStatus,
    new: RenderStatus,
    update: &JobUpdate,
) -> Result<(), StoreError> {
    if !expected.can_transition_to(new) {
        return Err(StoreError::InvalidTransition {
            from: expected,
            to: new,
        });
    }

    let assigning = expected == RenderStatus::Submitted && new == RenderStatus::ReadyToStart;
    match &update.worker {
        Some(worker) if assigning => validate_worker_name(worker)?,
        Some(_) => {
            return Err(StoreError::Validation(
                "worker can only be set when assigning a submitted job".to_string(),
            ))
        }
        None if assigning => {
            return Err(StoreError::Validation(
                "assigning a job requires a worker".to_string(),
            ))
        }
        None => {}
    }

    if let Some(percent) = update.progress_percent {
        check_progress(percent)?;
    }

    Ok(())
}

/// [`JobStore`] backed by the `render_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: NewRenderJob) -> Result<RenderJob, StoreError> {
        RenderJobRepo::create(&self.pool, &job)
            .await?
            .ok_or(StoreError::DuplicateKey(job.uid))
    }

    async fn get(&self, uid: JobUid) -> Result<RenderJob, StoreError> {
        RenderJobRepo::find_by_uid(&self.pool, uid)
            .await?
            .ok_or(StoreError::NotFound(uid))
    }

    async fn list(&self, filter: &RenderJobFilter) -> Result<Vec<RenderJob>, StoreError> {
        Ok(RenderJobRepo::list(&self.pool, filter).await?)
    }

    async fn compare_and_transition(
        &self,
        uid: JobUid,
        expected: RenderStatus,
        new: RenderStatus,
        update: &JobUpdate,
    ) -> Result<bool, StoreError> {
        validate_transition(expected, new, update)?;

        let applied =
            RenderJobRepo::compare_and_transition(&self.pool, uid, expected, new, update).await?;
        if !applied && !RenderJobRepo::exists(&self.pool, uid).await? {
            return Err(StoreError::NotFound(uid));
        }
        Ok(applied)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
