//! Handlers for the `/requests` resource.
//!
//! `PUT /requests/{uid}` is the status-update interface used by workers and
//! by engine-side progress scripts. It accepts either a JSON
//! [`StatusUpdate`] or the legacy `progress;time_estimate;status` text body.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use renderfarm_core::render_request::RenderRequest;
use renderfarm_core::status_update::StatusUpdate;
use renderfarm_core::types::JobUid;
use renderfarm_db::models::render_job::{JobUpdate, RenderJobFilter};
use renderfarm_db::submission::AssignOutcome;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /requests/{uid}/assign`. An empty body is accepted.
#[derive(Debug, Default, Deserialize)]
pub struct AssignBody {
    pub worker: Option<String>,
}

/// Query of `POST /requests`. `assign=false` creates the job without running
/// the assignment policy.
#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    #[serde(default = "assign_by_default")]
    pub assign: bool,
}

fn assign_by_default() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/requests?assign=
///
/// Create a job from a render request and run the assignment policy once,
/// unless `assign=false`. Returns 201 with the stored record.
pub async fn submit_request(
    State(state): State<AppState>,
    Query(params): Query<SubmitParams>,
    Json(input): Json<RenderRequest>,
) -> AppResult<impl IntoResponse> {
    let job = if params.assign {
        state.submitter.submit(input).await?
    } else {
        state.submitter.create(input).await?
    };
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/requests?worker=&status=
pub async fn list_requests(
    State(state): State<AppState>,
    Query(filter): Query<RenderJobFilter>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.store.list(&filter).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/requests/{uid}
pub async fn get_request(
    State(state): State<AppState>,
    Path(uid): Path<JobUid>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.get(uid).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Status update
// ---------------------------------------------------------------------------

/// PUT /api/v1/requests/{uid}
///
/// Guarded transition. Returns 200 with the updated record, or 409
/// `STATUS_CONFLICT` with the current record when the guard did not hold.
pub async fn update_status(
    State(state): State<AppState>,
    Path(uid): Path<JobUid>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let update = parse_status_update(&headers, &body)?;
    let expected = update.expected()?;

    let applied = state
        .store
        .compare_and_transition(uid, expected, update.status, &JobUpdate::from(&update))
        .await?;
    let job = state.store.get(uid).await?;

    if !applied {
        tracing::debug!(
            uid = %uid,
            expected = %expected,
            requested = %update.status,
            current = %job.status,
            "Status update rejected by guard",
        );
        return Err(AppError::StatusConflict(Box::new(job)));
    }

    if expected != update.status {
        tracing::info!(uid = %uid, from = %expected, to = %update.status, "Render job transitioned");
    }

    Ok(Json(DataResponse { data: job }))
}

/// Decode a status update from a JSON body, or from the legacy text body
/// for any other content type.
fn parse_status_update(headers: &HeaderMap, body: &[u8]) -> AppResult<StatusUpdate> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if is_json {
        return serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid status update: {e}")));
    }

    let text = std::str::from_utf8(body)
        .map_err(|_| AppError::BadRequest("Status update body is not UTF-8".to_string()))?;
    Ok(StatusUpdate::parse_legacy(text)?)
}

// ---------------------------------------------------------------------------
// Assign
// ---------------------------------------------------------------------------

/// POST /api/v1/requests/{uid}/assign
///
/// Assignment pass for a `submitted` job. 409 when the job is no longer
/// `submitted`, 422 when no worker can be chosen.
pub async fn assign_request(
    State(state): State<AppState>,
    Path(uid): Path<JobUid>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let input: AssignBody = if body.is_empty() {
        AssignBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid assign body: {e}")))?
    };

    match state.submitter.assign(uid, input.worker.as_deref()).await? {
        AssignOutcome::Assigned(job) => Ok(Json(DataResponse { data: job })),
        AssignOutcome::AlreadyAssigned(job) => Err(AppError::StatusConflict(Box::new(job))),
        AssignOutcome::NoWorker(_) => Err(AppError::NoWorker(format!(
            "no worker given and the {} policy could not choose one",
            state.submitter.policy().name()
        ))),
    }
}
