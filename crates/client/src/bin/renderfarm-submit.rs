//! Submit render jobs from flags or from a JSON file of requests.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use renderfarm_client::http_store::HttpJobStore;
use renderfarm_core::render_request::RenderRequest;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "renderfarm-submit")]
#[command(version)]
#[command(about = "Submit render jobs to the render farm")]
struct Args {
    /// Request server base URL
    #[arg(long, env = "RENDERFARM_STORE_URL", default_value = "http://127.0.0.1:3000")]
    store_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// JSON file holding an array of render requests
    #[arg(long, conflicts_with_all = ["name", "owner", "map", "sequence", "config", "worker", "uid"])]
    file: Option<PathBuf>,

    /// Job name
    #[arg(long, required_unless_present = "file")]
    name: Option<String>,

    /// Job owner
    #[arg(long, required_unless_present = "file")]
    owner: Option<String>,

    /// Map asset reference
    #[arg(long, required_unless_present = "file")]
    map: Option<String>,

    /// Level sequence asset reference
    #[arg(long, required_unless_present = "file")]
    sequence: Option<String>,

    /// Render config asset reference
    #[arg(long, required_unless_present = "file")]
    config: Option<String>,

    /// Worker allowed to claim the job
    #[arg(long)]
    worker: Option<String>,

    /// Caller-chosen job uid
    #[arg(long)]
    uid: Option<Uuid>,
}

impl Args {
    fn requests(&self) -> anyhow::Result<Vec<RenderRequest>> {
        if let Some(path) = &self.file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of requests", path.display()));
        }

        Ok(vec![RenderRequest {
            uid: self.uid,
            name: self.name.clone().unwrap_or_default(),
            owner: self.owner.clone().unwrap_or_default(),
            map_ref: self.map.clone().unwrap_or_default(),
            sequence_ref: self.sequence.clone().unwrap_or_default(),
            config_ref: self.config.clone().unwrap_or_default(),
            worker: self.worker.clone(),
        }])
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renderfarm_client=info,renderfarm_submit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let requests = args.requests()?;
    let store = HttpJobStore::new(&args.store_url, Duration::from_secs(args.timeout_secs))?;

    let mut failures = 0usize;
    for request in &requests {
        match store.submit(request).await {
            Ok(job) => {
                tracing::info!(
                    uid = %job.uid,
                    name = %job.name,
                    status = %job.status,
                    worker = job.worker.as_deref().unwrap_or("-"),
                    "Submitted render job",
                );
                println!("{}", job.uid);
            }
            Err(e) => {
                failures += 1;
                tracing::error!(name = %request.name, error = %e, "Submission failed");
            }
        }
    }

    tracing::info!(
        submitted = requests.len() - failures,
        failed = failures,
        "Submission complete"
    );

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
