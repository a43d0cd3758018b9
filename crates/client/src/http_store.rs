//! [`JobStore`] over the request server's HTTP interface.
//!
//! Every call is a single awaited request with a client-side timeout.
//! Connection failures and timeouts surface as [`StoreError::Unavailable`];
//! a `409 STATUS_CONFLICT` answer is a failed guard (`Ok(false)`), not an
//! error.

use std::time::Duration;

use async_trait::async_trait;
use renderfarm_core::render_request::RenderRequest;
use renderfarm_core::status::RenderStatus;
use renderfarm_core::status_update::StatusUpdate;
use renderfarm_core::types::JobUid;
use renderfarm_db::models::render_job::{JobUpdate, NewRenderJob, RenderJob, RenderJobFilter};
use renderfarm_db::store::{JobStore, StoreError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClientError;

/// Default timeout for a single store request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `{ "data": T }` success envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// `{ "error": msg, "code": CODE }` error envelope.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: String,
}

/// HTTP client for one request server.
#[derive(Debug, Clone)]
pub struct HttpJobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobStore {
    /// Create a store client for `base_url`, e.g. `http://farm:3000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Self::with_client(client, base_url)
    }

    /// Create a store client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a render request. The server validates it, creates the record
    /// and runs its assignment policy.
    pub async fn submit(&self, request: &RenderRequest) -> Result<RenderJob, StoreError> {
        self.post_request(request, true).await
    }

    async fn post_request(
        &self,
        request: &RenderRequest,
        assign: bool,
    ) -> Result<RenderJob, StoreError> {
        let response = self
            .client
            .post(self.requests_url())
            .query(&[("assign", assign)])
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => parse_data(response).await,
            _ => Err(self.error_from(response, request.uid).await),
        }
    }

    /// Send a guarded status update. `Ok(false)` when the guard did not
    /// hold on the server.
    pub async fn update_status(
        &self,
        uid: JobUid,
        update: &StatusUpdate,
    ) -> Result<bool, StoreError> {
        let response = self
            .client
            .put(self.job_url(uid))
            .json(update)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(true);
        }

        let status = response.status();
        let body = read_error(response).await;
        match (status, body.code.as_str()) {
            (StatusCode::CONFLICT, "STATUS_CONFLICT") => Ok(false),
            (StatusCode::UNPROCESSABLE_ENTITY, _) => Err(StoreError::InvalidTransition {
                from: update.expected_status.unwrap_or(update.status),
                to: update.status,
            }),
            _ => Err(classify(status, body, Some(uid))),
        }
    }

    // ---- private helpers ----

    fn requests_url(&self) -> String {
        format!("{}/api/v1/requests", self.base_url)
    }

    fn job_url(&self, uid: JobUid) -> String {
        format!("{}/api/v1/requests/{uid}", self.base_url)
    }

    async fn error_from(&self, response: reqwest::Response, uid: Option<JobUid>) -> StoreError {
        let status = response.status();
        let body = read_error(response).await;
        classify(status, body, uid)
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    /// Creates the job in `submitted` state; the server's assignment policy
    /// is not run.
    async fn create(&self, job: NewRenderJob) -> Result<RenderJob, StoreError> {
        let request = RenderRequest {
            uid: Some(job.uid),
            name: job.name,
            owner: job.owner,
            map_ref: job.map_ref,
            sequence_ref: job.sequence_ref,
            config_ref: job.config_ref,
            worker: job.worker,
        };
        self.post_request(&request, false).await
    }

    async fn get(&self, uid: JobUid) -> Result<RenderJob, StoreError> {
        let response = self
            .client
            .get(self.job_url(uid))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            parse_data(response).await
        } else {
            Err(self.error_from(response, Some(uid)).await)
        }
    }

    async fn list(&self, filter: &RenderJobFilter) -> Result<Vec<RenderJob>, StoreError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(worker) = &filter.worker {
            query.push(("worker", worker.clone()));
        }
        if let Some(status) = filter.status {
            query.push(("status", status.as_str().to_string()));
        }

        let response = self
            .client
            .get(self.requests_url())
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            parse_data(response).await
        } else {
            Err(self.error_from(response, None).await)
        }
    }

    async fn compare_and_transition(
        &self,
        uid: JobUid,
        expected: RenderStatus,
        new: RenderStatus,
        update: &JobUpdate,
    ) -> Result<bool, StoreError> {
        let body = StatusUpdate {
            status: new,
            expected_status: Some(expected),
            progress_percent: update.progress_percent,
            time_estimate: update.time_estimate.clone(),
            error_message: update.error_message.clone(),
            worker: update.worker.clone(),
        };
        self.update_status(uid, &body).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        #[derive(Deserialize)]
        struct Health {
            store_healthy: bool,
        }

        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;

        let health: Health = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(format!("Invalid health response: {e}")))?;
        if health.store_healthy {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "request server reports its store as unhealthy".to_string(),
            ))
        }
    }
}

/// Map a failed send to the store error taxonomy. Anything that prevented a
/// response from arriving counts as unavailability.
fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_builder() {
        StoreError::Protocol(err.to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

async fn parse_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    response
        .json::<Envelope<T>>()
        .await
        .map(|envelope| envelope.data)
        .map_err(|e| {
            if e.is_timeout() {
                StoreError::Unavailable(e.to_string())
            } else {
                StoreError::Protocol(format!("Invalid response body: {e}"))
            }
        })
}

async fn read_error(response: reqwest::Response) -> ErrorBody {
    response.json::<ErrorBody>().await.unwrap_or_default()
}

fn classify(status: StatusCode, body: ErrorBody, uid: Option<JobUid>) -> StoreError {
    match (status, uid) {
        (StatusCode::NOT_FOUND, Some(uid)) => StoreError::NotFound(uid),
        (StatusCode::CONFLICT, Some(uid)) if body.code == "DUPLICATE_KEY" => {
            StoreError::DuplicateKey(uid)
        }
        (StatusCode::BAD_REQUEST, _) => StoreError::Validation(body.error),
        (StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT, _)
        | (StatusCode::REQUEST_TIMEOUT, _) => StoreError::Unavailable(format!(
            "request server answered {status}"
        )),
        _ => StoreError::Protocol(format!(
            "unexpected {status} ({}): {}",
            body.code, body.error
        )),
    }
}
