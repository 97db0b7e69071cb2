use thiserror::Error;

/// Failures of a single network round-trip.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unavailable")]
    Offline,

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Failures of the cache store backing the worker.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid cache name: {0}")]
    InvalidName(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Malformed cache file: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to seed cache with {resource}: {reason}")]
    Seeding { resource: String, reason: String },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid sync document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Host call failed: {0}")]
    Host(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker is shut down")]
    Shutdown,
}

/// Maximum length for reasons carried in seeding errors
const MAX_REASON_LENGTH: usize = 200;

impl WorkerError {
    pub fn seeding(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let reason = reason.to_string();
        let reason = if reason.len() <= MAX_REASON_LENGTH {
            reason
        } else {
            let mut end = MAX_REASON_LENGTH;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &reason[..end])
        };
        WorkerError::Seeding {
            resource: resource.into(),
            reason,
        }
    }

    /// True when the failure came from the network rather than local state
    pub fn is_network(&self) -> bool {
        matches!(self, WorkerError::Network(_))
    }
}
