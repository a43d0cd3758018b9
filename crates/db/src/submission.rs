//! Job submission and worker assignment.
//!
//! [`Submitter::submit`] validates a [`RenderRequest`], creates the record
//! and runs the configured [`AssignmentPolicy`] once. [`Submitter::assign`]
//! is the separate assignment pass for jobs that were left `submitted`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use renderfarm_core::assignment::AssignmentPolicy;
use renderfarm_core::render_request::{validate_worker_name, RenderRequest};
use renderfarm_core::status::RenderStatus;
use renderfarm_core::types::{new_job_uid, JobUid};

use crate::models::render_job::{JobUpdate, NewRenderJob, RenderJob};
use crate::store::{JobStore, StoreError};

/// Result of an assignment pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignOutcome {
    /// The job moved to `ready_to_start` for the contained worker.
    Assigned(RenderJob),
    /// The job is no longer `submitted`, or is bound to a different worker.
    AlreadyAssigned(RenderJob),
    /// No worker was given and the policy could not choose one.
    NoWorker(RenderJob),
}

/// Creates job records and moves them to `ready_to_start`.
pub struct Submitter {
    store: Arc<dyn JobStore>,
    policy: AssignmentPolicy,
    ticket: AtomicUsize,
}

impl Submitter {
    pub fn new(store: Arc<dyn JobStore>, policy: AssignmentPolicy) -> Self {
        Self {
            store,
            policy,
            ticket: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> &AssignmentPolicy {
        &self.policy
    }

    /// Validate and create a new job, leaving it `submitted`.
    pub async fn create(&self, request: RenderRequest) -> Result<RenderJob, StoreError> {
        request.check()?;

        let uid = request.uid.unwrap_or_else(new_job_uid);
        let job = self
            .store
            .create(NewRenderJob::from_request(uid, &request))
            .await?;

        tracing::info!(
            uid = %job.uid,
            name = %job.name,
            owner = %job.owner,
            "Render job submitted",
        );
        Ok(job)
    }

    /// Validate, create, and (policy permitting) assign a new job.
    ///
    /// Returns the record as stored after assignment. Validation failures
    /// happen before any store mutation.
    pub async fn submit(&self, request: RenderRequest) -> Result<RenderJob, StoreError> {
        let job = self.create(request).await?;
        let uid = job.uid;

        let Some(worker) = self.choose_worker(job.worker.as_deref()) else {
            tracing::debug!(uid = %uid, policy = self.policy.name(), "No worker chosen, job stays submitted");
            return Ok(job);
        };

        match self.transition_to_ready(uid, &worker).await? {
            true => self.store.get(uid).await,
            false => {
                tracing::warn!(uid = %uid, worker = %worker, "Job changed before it could be assigned");
                self.store.get(uid).await
            }
        }
    }

    /// Assign a `submitted` job. `worker` takes precedence over the policy,
    /// but a worker already recorded on the job wins: a different `worker`
    /// is refused with [`AssignOutcome::AlreadyAssigned`].
    pub async fn assign(
        &self,
        uid: JobUid,
        worker: Option<&str>,
    ) -> Result<AssignOutcome, StoreError> {
        let job = self.store.get(uid).await?;
        if job.status != RenderStatus::Submitted {
            return Ok(AssignOutcome::AlreadyAssigned(job));
        }

        let requested = worker.or(job.worker.as_deref());
        let Some(worker) = self.choose_worker(requested) else {
            return Ok(AssignOutcome::NoWorker(job));
        };
        validate_worker_name(&worker)?;

        let assigned = self.transition_to_ready(uid, &worker).await?;
        let job = self.store.get(uid).await?;
        Ok(if assigned {
            AssignOutcome::Assigned(job)
        } else {
            AssignOutcome::AlreadyAssigned(job)
        })
    }

    fn choose_worker(&self, requested: Option<&str>) -> Option<String> {
        match requested {
            Some(worker) => self.policy.select(Some(worker), 0),
            None => self
                .policy
                .select(None, self.ticket.fetch_add(1, Ordering::Relaxed)),
        }
    }

    async fn transition_to_ready(&self, uid: JobUid, worker: &str) -> Result<bool, StoreError> {
        let assigned = self
            .store
            .compare_and_transition(
                uid,
                RenderStatus::Submitted,
                RenderStatus::ReadyToStart,
                &JobUpdate::assign(worker),
            )
            .await?;
        if assigned {
            tracing::info!(uid = %uid, worker = %worker, "Render job assigned");
        }
        Ok(assigned)
    }
}
