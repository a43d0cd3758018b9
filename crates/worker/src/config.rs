use std::str::FromStr;
use std::time::Duration;

use renderfarm_core::render_request::validate_worker_name;
use renderfarm_db::models::render_job::RenderJob;

use crate::engine::{EngineTemplate, DEFAULT_ENGINE_ARGS};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 4 * 60 * 60;
const DEFAULT_KILL_GRACE_SECS: u64 = 10;
const DEFAULT_STORE_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Order in which a worker picks among several claimable jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimOrder {
    /// Oldest `created_at` first.
    #[default]
    Fifo,
    /// Newest `created_at` first.
    Lifo,
}

impl ClaimOrder {
    /// Sort candidates so the preferred job comes first. Ties on
    /// `created_at` fall back to the uid.
    pub fn sort(self, jobs: &mut [RenderJob]) {
        jobs.sort_by(|a, b| (a.created_at, a.uid).cmp(&(b.created_at, b.uid)));
        if self == ClaimOrder::Lifo {
            jobs.reverse();
        }
    }
}

impl FromStr for ClaimOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(ClaimOrder::Fifo),
            "lifo" => Ok(ClaimOrder::Lifo),
            other => Err(format!("expected fifo or lifo, got {other:?}")),
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity matched against the job's `worker` field.
    pub worker_name: String,
    /// Request server base URL; also handed to the engine.
    pub store_url: String,
    pub poll_interval: Duration,
    /// Wall-clock budget for one render.
    pub render_timeout: Duration,
    /// Time between SIGTERM and SIGKILL when stopping the engine.
    pub kill_grace: Duration,
    pub claim_order: ClaimOrder,
    pub engine: EngineTemplate,
    pub store_request_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Required | Default              |
    /// |------------------------------|----------|----------------------|
    /// | `WORKER_NAME`                | yes      | --                   |
    /// | `STORE_URL`                  | yes      | --                   |
    /// | `ENGINE_PROGRAM`             | yes      | --                   |
    /// | `ENGINE_ARGS`                | no       | movie render invocation |
    /// | `POLL_INTERVAL_SECS`         | no       | `10`                 |
    /// | `RENDER_TIMEOUT_SECS`        | no       | `14400`              |
    /// | `ENGINE_KILL_GRACE_SECS`     | no       | `10`                 |
    /// | `CLAIM_ORDER`                | no       | `fifo`               |
    /// | `STORE_REQUEST_TIMEOUT_SECS` | no       | `10`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));
        let secs = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(var) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(0) => Err(ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: "must be greater than zero".into(),
                    }),
                    Ok(n) => Ok(Duration::from_secs(n)),
                    Err(e) => Err(ConfigError::Invalid {
                        var,
                        value: raw,
                        reason: e.to_string(),
                    }),
                },
            }
        };

        let worker_name = required("WORKER_NAME")?.trim().to_string();
        validate_worker_name(&worker_name).map_err(|e| ConfigError::Invalid {
            var: "WORKER_NAME",
            value: worker_name.clone(),
            reason: e.to_string(),
        })?;

        let store_url = required("STORE_URL")?.trim().trim_end_matches('/').to_string();

        let claim_order = match get("CLAIM_ORDER") {
            None => ClaimOrder::default(),
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                var: "CLAIM_ORDER",
                value: raw,
                reason,
            })?,
        };

        let program = required("ENGINE_PROGRAM")?;
        let args = get("ENGINE_ARGS").unwrap_or_else(|| DEFAULT_ENGINE_ARGS.to_string());
        let engine = EngineTemplate::parse(&program, &args).map_err(|e| ConfigError::Invalid {
            var: "ENGINE_ARGS",
            value: args.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            worker_name,
            store_url,
            poll_interval: secs("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            render_timeout: secs("RENDER_TIMEOUT_SECS", DEFAULT_RENDER_TIMEOUT_SECS)?,
            kill_grace: secs("ENGINE_KILL_GRACE_SECS", DEFAULT_KILL_GRACE_SECS)?,
            claim_order,
            engine,
            store_request_timeout: secs(
                "STORE_REQUEST_TIMEOUT_SECS",
                DEFAULT_STORE_REQUEST_TIMEOUT_SECS,
            )?,
        })
    }
}
