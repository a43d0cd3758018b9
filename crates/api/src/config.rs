/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-node farm. In production,
/// override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// PostgreSQL URL. Without it, jobs are kept in process memory.
    pub database_url: Option<String>,
    /// `manual` or `round_robin` (default: `manual`).
    pub assignment_policy: String,
    /// Static worker pool for round-robin assignment.
    pub worker_pool: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`         | unset (in-memory store)    |
    /// | `ASSIGNMENT_POLICY`    | `manual`                   |
    /// | `WORKER_POOL`          | empty                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = split_list(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let assignment_policy =
            std::env::var("ASSIGNMENT_POLICY").unwrap_or_else(|_| "manual".into());

        let worker_pool = split_list(&std::env::var("WORKER_POOL").unwrap_or_default());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            assignment_policy,
            worker_pool,
        }
    }
}

/// Split a comma-separated list, dropping empty entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" W1, W2 ,,W3"), vec!["W1", "W2", "W3"]);
        assert!(split_list("").is_empty());
    }
}
