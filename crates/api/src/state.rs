use std::sync::Arc;

use renderfarm_core::assignment::AssignmentPolicy;
use renderfarm_db::store::JobStore;
use renderfarm_db::submission::Submitter;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The job record store.
    pub store: Arc<dyn JobStore>,
    /// Creates and assigns jobs against `store`.
    pub submitter: Arc<Submitter>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, policy: AssignmentPolicy, config: ServerConfig) -> Self {
        let submitter = Arc::new(Submitter::new(Arc::clone(&store), policy));
        Self {
            store,
            submitter,
            config: Arc::new(config),
        }
    }
}
