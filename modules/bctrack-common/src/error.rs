use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// Network-level failure talking to a source. Retryable.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The source asked us to slow down. Retryable.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The source returned data we could not make sense of. Never retried.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A cycle trigger arrived while one was already running.
    #[error("ingestion cycle already in progress")]
    CycleInProgress,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TrackerError {
    /// Stable classification string stored in the scrape_errors audit trail.
    pub fn error_kind(&self) -> &'static str {
        match self {
            TrackerError::Fetch(_) => "transient_fetch",
            TrackerError::RateLimited(_) => "rate_limited",
            TrackerError::MalformedRecord(_) => "malformed_record",
            TrackerError::Database(_) => "persistence",
            TrackerError::Config(_) => "config",
            TrackerError::CycleInProgress => "cycle_in_progress",
            TrackerError::Anyhow(_) => "internal",
        }
    }

    /// Transient failures are retried with backoff; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackerError::Fetch(_) | TrackerError::RateLimited(_))
    }

    /// Storage-unavailable failures abort the remaining cycle. Constraint
    /// violations do not — they are fatal only to the record being written.
    pub fn is_cycle_fatal(&self) -> bool {
        match self {
            TrackerError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
