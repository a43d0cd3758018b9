//! In-process [`JobStore`] used by tests and by single-node deployments
//! without a database.
//!
//! A single `RwLock` write guard spans the status check and the update, so
//! concurrent transitions on the same record serialize.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::JobUid;
use tokio::sync::RwLock;

use crate::models::render_job::{JobUpdate, NewRenderJob, RenderJob, RenderJobFilter};
use crate::store::{validate_transition, JobStore, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobUid, RenderJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: NewRenderJob) -> Result<RenderJob, StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.uid) {
            return Err(StoreError::DuplicateKey(job.uid));
        }
        let record = RenderJob::submitted(job, Utc::now());
        jobs.insert(record.uid, record.clone());
        Ok(record)
    }

    async fn get(&self, uid: JobUid) -> Result<RenderJob, StoreError> {
        self.jobs
            .read()
            .await
            .get(&uid)
            .cloned()
            .ok_or(StoreError::NotFound(uid))
    }

    async fn list(&self, filter: &RenderJobFilter) -> Result<Vec<RenderJob>, StoreError> {
        let mut matching: Vec<RenderJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.uid.cmp(&b.uid)));
        Ok(matching)
    }

    async fn compare_and_transition(
        &self,
        uid: JobUid,
        expected: RenderStatus,
        new: RenderStatus,
        update: &JobUpdate,
    ) -> Result<bool, StoreError> {
        validate_transition(expected, new, update)?;

        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&uid).ok_or(StoreError::NotFound(uid))?;

        if job.status != expected {
            return Ok(false);
        }
        if let (Some(current), Some(requested)) = (&job.worker, &update.worker) {
            if current != requested {
                return Ok(false);
            }
        }

        job.apply_transition(expected, new, update, Utc::now());
        Ok(true)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
