use renderfarm_db::store::StoreError;

/// Errors from the client-side components.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured store URL cannot be used.
    #[error("Invalid store URL \"{0}\"")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// A non-retryable store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store stayed unavailable for every attempt.
    #[error("{operation} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        last: StoreError,
    },
}
