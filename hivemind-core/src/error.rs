use uuid::Uuid;

/// Result type alias for knowledge-commons operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the knowledge lifecycle engine
///
/// Validation, auth, policy, and content-policy variants are returned to the
/// caller; dependency failures degrade gracefully at the call site instead of
/// surfacing here wherever the pipeline allows it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    #[error("Content rejected: {0}")]
    ContentRejected(String),

    #[error("Knowledge item not found: {0}")]
    NotFound(Uuid),

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Storage(_) => true,
            Error::Dependency(_) => true,
            Error::Io(_) => true,
            Error::Validation(_)
            | Error::Auth(_)
            | Error::QuotaExceeded(_)
            | Error::PolicyDenied(_)
            | Error::ContentRejected(_)
            | Error::NotFound(_)
            | Error::Serialization(_)
            | Error::InvalidInput(_)
            | Error::InvalidState(_) => false,
        }
    }
}
