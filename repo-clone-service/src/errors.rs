use thiserror::Error;

pub type Result<T> = std::result::Result<T, CloneError>;

/// Clone failures, split along the retry boundary the workflow driver needs.
#[derive(Debug, Error)]
pub enum CloneError {
    /// Authentication / permission / not-found; retrying cannot help.
    #[error("non-retryable clone error: {0}")]
    NonRetryable(String),

    /// Network, rate limits, transient git failures.
    #[error("retryable clone error: {0}")]
    Retryable(String),

    /// The checked-out HEAD does not match the requested commit.
    #[error("sha validation failed: expected {expected}, got {actual}")]
    ShaValidation { expected: String, actual: String },

    /// Clone landed over the configured size cap.
    #[error("clone size {size_mb} MB exceeds limit of {limit_mb} MB")]
    ResourceExhausted { size_mb: u64, limit_mb: u64 },

    /// Caller supplied a malformed commit SHA.
    #[error("invalid commit sha: {0}")]
    InvalidSha(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloneError {
    /// Whether the workflow driver should retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloneError::Retryable(_) | CloneError::Io(_))
    }
}

/// Map a git stderr line onto the retry boundary.
pub(crate) fn classify_git_failure(context: &str, stderr: &str) -> CloneError {
    let lower = stderr.to_lowercase();
    let non_retryable = ["401", "403", "404", "unauthorized", "forbidden", "not found", "authentication failed", "permission denied"]
        .iter()
        .any(|marker| lower.contains(marker));

    if non_retryable {
        CloneError::NonRetryable(format!("{context}: {}", stderr.trim()))
    } else {
        CloneError::Retryable(format!("{context}: {}", stderr.trim()))
    }
}
