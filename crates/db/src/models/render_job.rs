//! Render job entity model and DTOs.

use renderfarm_core::render_request::RenderRequest;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::status_update::{StatusUpdate, TIME_ESTIMATE_UNKNOWN};
use renderfarm_core::types::{JobUid, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `render_jobs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RenderJob {
    pub uid: JobUid,
    pub name: String,
    pub owner: String,
    pub map_ref: String,
    pub sequence_ref: String,
    pub config_ref: String,
    pub worker: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RenderStatus,
    pub progress_percent: f64,
    pub time_estimate: String,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

/// Input for [`JobStore::create`](crate::store::JobStore::create).
#[derive(Debug, Clone)]
pub struct NewRenderJob {
    pub uid: JobUid,
    pub name: String,
    pub owner: String,
    pub map_ref: String,
    pub sequence_ref: String,
    pub config_ref: String,
    /// Pre-assigned worker, if the submitter named one.
    pub worker: Option<String>,
}

impl NewRenderJob {
    /// Build the store input from a validated request and its final uid.
    pub fn from_request(uid: JobUid, request: &RenderRequest) -> Self {
        Self {
            uid,
            name: request.name.trim().to_string(),
            owner: request.owner.trim().to_string(),
            map_ref: request.map_ref.trim().to_string(),
            sequence_ref: request.sequence_ref.trim().to_string(),
            config_ref: request.config_ref.trim().to_string(),
            worker: request.worker.clone(),
        }
    }
}

/// Filter for `list`. Both fields are optional and combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderJobFilter {
    pub worker: Option<String>,
    pub status: Option<RenderStatus>,
}

impl RenderJobFilter {
    /// Jobs assigned to `worker` that are waiting to be claimed.
    pub fn claimable_by(worker: &str) -> Self {
        Self {
            worker: Some(worker.to_string()),
            status: Some(RenderStatus::ReadyToStart),
        }
    }

    pub fn matches(&self, job: &RenderJob) -> bool {
        self.worker
            .as_deref()
            .map_or(true, |w| job.worker.as_deref() == Some(w))
            && self.status.map_or(true, |s| job.status == s)
    }
}

/// Field updates applied together with a guarded status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    /// Only accepted on `submitted -> ready_to_start`.
    pub worker: Option<String>,
    pub progress_percent: Option<f64>,
    pub time_estimate: Option<String>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn assign(worker: impl Into<String>) -> Self {
        Self {
            worker: Some(worker.into()),
            ..Self::default()
        }
    }

    pub fn progress(percent: f64, time_estimate: impl Into<String>) -> Self {
        Self {
            progress_percent: Some(percent),
            time_estimate: Some(time_estimate.into()),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl From<&StatusUpdate> for JobUpdate {
    fn from(update: &StatusUpdate) -> Self {
        Self {
            worker: update.worker.clone(),
            progress_percent: update.progress_percent,
            time_estimate: update.time_estimate.clone(),
            error_message: update.error_message.clone(),
        }
    }
}

/// How a guarded transition rewrites the progress fields. Shared by every
/// store so the in-memory and SQL paths agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransitionEffects {
    /// Entering `in_progress` from `ready_to_start`: progress resets to 0.
    pub entering_progress: bool,
    /// Entering `finished`: progress is pinned to 100.
    pub finishing: bool,
    /// Entering `finished` or `error`.
    pub terminal: bool,
}

impl TransitionEffects {
    pub(crate) fn of(expected: RenderStatus, new: RenderStatus) -> Self {
        Self {
            entering_progress: expected != RenderStatus::InProgress
                && new == RenderStatus::InProgress,
            finishing: new == RenderStatus::Finished,
            terminal: new.is_terminal(),
        }
    }
}

impl RenderJob {
    /// A freshly created record in `submitted` state.
    pub fn submitted(input: NewRenderJob, now: Timestamp) -> Self {
        Self {
            uid: input.uid,
            name: input.name,
            owner: input.owner,
            map_ref: input.map_ref,
            sequence_ref: input.sequence_ref,
            config_ref: input.config_ref,
            worker: input.worker,
            status: RenderStatus::Submitted,
            progress_percent: 0.0,
            time_estimate: TIME_ESTIMATE_UNKNOWN.to_string(),
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply an already-guarded transition in place. Callers must have
    /// checked that `self.status == expected`.
    pub(crate) fn apply_transition(
        &mut self,
        expected: RenderStatus,
        new: RenderStatus,
        update: &JobUpdate,
        now: Timestamp,
    ) {
        let effects = TransitionEffects::of(expected, new);

        if self.worker.is_none() {
            self.worker = update.worker.clone();
        }

        self.progress_percent = if effects.finishing {
            100.0
        } else if effects.entering_progress {
            0.0
        } else {
            update
                .progress_percent
                .map_or(self.progress_percent, |p| p.max(self.progress_percent))
        };

        if effects.entering_progress {
            self.time_estimate = update
                .time_estimate
                .clone()
                .unwrap_or_else(|| TIME_ESTIMATE_UNKNOWN.to_string());
            self.started_at = Some(now);
        } else if let Some(estimate) = &update.time_estimate {
            self.time_estimate = estimate.clone();
        }

        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if effects.terminal {
            self.finished_at = Some(now);
        }

        self.status = new;
        self.updated_at = now;
    }
}
