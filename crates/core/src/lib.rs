//! Pure domain logic for the render farm: the job status graph, request
//! validation, the status-update wire format, assignment policies and retry
//! backoff. Nothing in this crate performs I/O.

pub mod assignment;
pub mod backoff;
pub mod error;
pub mod render_request;
pub mod status;
pub mod status_update;
pub mod types;
