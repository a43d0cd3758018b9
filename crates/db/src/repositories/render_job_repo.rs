//! Repository for the `render_jobs` table.
//!
//! Every status change goes through [`RenderJobRepo::compare_and_transition`],
//! a single guarded `UPDATE` whose `WHERE status = $expected` clause makes
//! concurrent claims on the same row serialize inside PostgreSQL.

use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::JobUid;
use sqlx::PgPool;

use crate::models::render_job::{
    JobUpdate, NewRenderJob, RenderJob, RenderJobFilter, TransitionEffects,
};

/// Column list for `render_jobs` queries.
const COLUMNS: &str = "\
    uid, name, owner, map_ref, sequence_ref, config_ref, worker, status, \
    progress_percent, time_estimate, error_message, \
    created_at, updated_at, started_at, finished_at";

/// Provides the atomic operations backing [`PgJobStore`](crate::store::PgJobStore).
pub struct RenderJobRepo;

impl RenderJobRepo {
    /// Insert a new `submitted` job.
    ///
    /// Returns `None` if a job with the same uid already exists.
    pub async fn create(
        pool: &PgPool,
        input: &NewRenderJob,
    ) -> Result<Option<RenderJob>, sqlx::Error> {
        let query = format!(
            "INSERT INTO render_jobs \
                 (uid, name, owner, map_ref, sequence_ref, config_ref, worker, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (uid) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(input.uid)
            .bind(&input.name)
            .bind(&input.owner)
            .bind(&input.map_ref)
            .bind(&input.sequence_ref)
            .bind(&input.config_ref)
            .bind(&input.worker)
            .bind(RenderStatus::Submitted.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its uid.
    pub async fn find_by_uid(
        pool: &PgPool,
        uid: JobUid,
    ) -> Result<Option<RenderJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM render_jobs WHERE uid = $1");
        sqlx::query_as::<_, RenderJob>(&query)
            .bind(uid)
            .fetch_optional(pool)
            .await
    }

    /// List jobs matching the filter, oldest first.
    pub async fn list(
        pool: &PgPool,
        filter: &RenderJobFilter,
    ) -> Result<Vec<RenderJob>, sqlx::Error> {
        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if filter.worker.is_some() {
            conditions.push(format!("worker = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM render_jobs \
             {where_clause} \
             ORDER BY created_at ASC, uid ASC"
        );

        let mut q = sqlx::query_as::<_, RenderJob>(&query);
        if let Some(worker) = &filter.worker {
            q = q.bind(worker);
        }
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }

        q.fetch_all(pool).await
    }

    /// Apply `update` and move the job to `new` iff it is currently in
    /// `expected`. Returns `true` if a row was changed.
    ///
    /// A supplied worker must match any worker already on the row, so the
    /// worker column is write-once.
    pub async fn compare_and_transition(
        pool: &PgPool,
        uid: JobUid,
        expected: RenderStatus,
        new: RenderStatus,
        update: &JobUpdate,
    ) -> Result<bool, sqlx::Error> {
        let effects = TransitionEffects::of(expected, new);

        let result = sqlx::query(
            "UPDATE render_jobs SET \
                 status = $3, \
                 worker = COALESCE(worker, $4), \
                 progress_percent = CASE \
                     WHEN $8 THEN 100 \
                     WHEN $9 THEN 0 \
                     ELSE GREATEST(progress_percent, COALESCE($5, progress_percent)) \
                 END, \
                 time_estimate = CASE \
                     WHEN $9 THEN COALESCE($6, 'unknown') \
                     ELSE COALESCE($6, time_estimate) \
                 END, \
                 error_message = COALESCE($7, error_message), \
                 started_at = CASE WHEN $9 THEN NOW() ELSE started_at END, \
                 finished_at = CASE WHEN $10 THEN NOW() ELSE finished_at END, \
                 updated_at = NOW() \
             WHERE uid = $1 AND status = $2 \
               AND ($4::TEXT IS NULL OR worker IS NULL OR worker = $4)",
        )
        .bind(uid)
        .bind(expected.as_str())
        .bind(new.as_str())
        .bind(&update.worker)
        .bind(update.progress_percent)
        .bind(&update.time_estimate)
        .bind(&update.error_message)
        .bind(effects.finishing)
        .bind(effects.entering_progress)
        .bind(effects.terminal)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether a job with this uid exists.
    pub async fn exists(pool: &PgPool, uid: JobUid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM render_jobs WHERE uid = $1)")
            .bind(uid)
            .fetch_one(pool)
            .await
    }
}
