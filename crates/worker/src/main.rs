//! `renderfarm-worker` -- render node daemon.
//!
//! Claims jobs assigned to `WORKER_NAME` from the request server and runs
//! the engine for each one, one job at a time.
//!
//! # Environment variables
//!
//! | Variable                     | Required | Default | Description                              |
//! |------------------------------|----------|---------|------------------------------------------|
//! | `WORKER_NAME`                | yes      | --      | Worker identity matched against jobs     |
//! | `STORE_URL`                  | yes      | --      | Request server, e.g. `http://farm:3000`  |
//! | `ENGINE_PROGRAM`             | yes      | --      | Engine executable                        |
//! | `ENGINE_ARGS`                | no       | movie render invocation | Argument template        |
//! | `POLL_INTERVAL_SECS`         | no       | `10`    | Sleep between iterations                 |
//! | `RENDER_TIMEOUT_SECS`        | no       | `14400` | Wall-clock budget per render             |
//! | `ENGINE_KILL_GRACE_SECS`     | no       | `10`    | SIGTERM to SIGKILL delay                 |
//! | `CLAIM_ORDER`                | no       | `fifo`  | `fifo` or `lifo`                         |
//! | `STORE_REQUEST_TIMEOUT_SECS` | no       | `10`    | Per-request timeout for store calls      |

use std::sync::Arc;

use renderfarm_client::http_store::HttpJobStore;
use renderfarm_db::store::JobStore;
use renderfarm_worker::config::WorkerConfig;
use renderfarm_worker::poll_loop::WorkerLoop;
use renderfarm_worker::runner::{EngineRunner, TaskRunner};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renderfarm_worker=info,renderfarm_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid worker configuration");
        std::process::exit(1);
    });

    let store = HttpJobStore::new(&config.store_url, config.store_request_timeout)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Cannot create store client");
            std::process::exit(1);
        });

    tracing::info!(
        worker = %config.worker_name,
        store_url = %config.store_url,
        engine = %config.engine.program(),
        render_timeout_secs = config.render_timeout.as_secs(),
        claim_order = ?config.claim_order,
        "Starting renderfarm-worker",
    );

    if let Err(e) = store.health_check().await {
        tracing::warn!(error = %e, "Request server not reachable yet");
    }

    let runner = EngineRunner::new(
        config.engine.clone(),
        config.worker_name.clone(),
        config.store_url.clone(),
        config.kill_grace,
    );
    let worker = WorkerLoop::from_config(
        &config,
        Arc::new(store) as Arc<dyn JobStore>,
        Arc::new(runner) as Arc<dyn TaskRunner>,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    worker.run(cancel).await;
    tracing::info!("Worker shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping worker");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping worker");
        }
    }
}
