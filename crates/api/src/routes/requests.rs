//! Route definitions for the `/requests` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::requests;
use crate::state::AppState;

/// Routes mounted at `/requests`.
///
/// ```text
/// GET    /                -> list_requests
/// POST   /                -> submit_request
/// GET    /{uid}           -> get_request
/// PUT    /{uid}           -> update_status
/// POST   /{uid}/assign    -> assign_request
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(requests::list_requests).post(requests::submit_request),
        )
        .route(
            "/{uid}",
            get(requests::get_request).put(requests::update_status),
        )
        .route("/{uid}/assign", post(requests::assign_request))
}
