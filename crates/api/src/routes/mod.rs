pub mod health;
pub mod requests;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /requests                     list, submit
/// /requests/{uid}               get, guarded status update (PUT)
/// /requests/{uid}/assign        assignment pass (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/requests", requests::router())
}
