//! Clients of the render farm request server.
//!
//! [`http_store::HttpJobStore`] implements the `JobStore` contract over HTTP;
//! [`reporter::ProgressReporter`] is the narrow progress/result interface
//! used from inside a running render.

pub mod error;
pub mod http_store;
pub mod reporter;
pub mod retry;

/// Env var carrying the job uid into the engine process.
pub const ENV_JOB_UID: &str = "RENDERFARM_JOB_UID";

/// Env var carrying the request server base URL into the engine process.
pub const ENV_STORE_URL: &str = "RENDERFARM_STORE_URL";

/// Env var carrying the worker identity into the engine process.
pub const ENV_WORKER: &str = "RENDERFARM_WORKER";
