//! Progress reporting CLI for engine-side scripts.
//!
//! Exit codes: 0 the push applied, 2 the job is no longer `in_progress`,
//! 1 the request server could not be reached or rejected the request.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use renderfarm_client::http_store::HttpJobStore;
use renderfarm_client::reporter::ProgressReporter;
use renderfarm_core::backoff::RetryConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "renderfarm-report")]
#[command(version)]
#[command(about = "Report render progress or completion to the render farm")]
struct Args {
    /// Job uid (set by the worker in the engine environment)
    #[arg(long, env = "RENDERFARM_JOB_UID")]
    uid: Uuid,

    /// Request server base URL
    #[arg(long, env = "RENDERFARM_STORE_URL")]
    store_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Attempts for finished/failed pushes
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Push live progress
    Progress {
        /// Completion percentage, clamped to 0..=100
        #[arg(long)]
        percent: f64,

        /// Remaining-time estimate
        #[arg(long, default_value = "")]
        eta: String,
    },

    /// Mark the job finished
    Finished,

    /// Mark the job failed
    Failed {
        /// Diagnostic recorded on the job
        #[arg(long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renderfarm_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let store = match HttpJobStore::new(&args.store_url, Duration::from_secs(args.timeout_secs)) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Cannot create store client");
            return ExitCode::FAILURE;
        }
    };

    let retry = RetryConfig {
        max_attempts: args.max_attempts,
        ..RetryConfig::default()
    };
    let reporter = ProgressReporter::new(Arc::new(store), args.uid, retry);

    let result = match &args.command {
        Command::Progress { percent, eta } => reporter.report_progress(*percent, eta).await,
        Command::Finished => reporter.report_finished().await,
        Command::Failed { message } => reporter.report_failed(message).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!(uid = %args.uid, error = %e, "Report failed");
            ExitCode::FAILURE
        }
    }
}
