/// Render job identifiers are UUIDs (v7 when generated by the server).
pub type JobUid = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh, time-ordered job identifier.
pub fn new_job_uid() -> JobUid {
    uuid::Uuid::now_v7()
}
