use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Error processing {}: {source}", path.display())]
    Adapter {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Timed out waiting for cached result of '{key}' after {attempts} polls")]
    CoalescingTimeout { key: String, attempts: u32 },

    #[error("Nothing persisted at {}", .0.display())]
    PersistenceMissing(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Wrap an adapter failure with the path of the file being processed.
    pub fn adapter(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::Adapter { path: path.into(), source: source.into() }
    }

    /// Followers that gave up waiting may retry; every other failure is final for that call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CoalescingTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
