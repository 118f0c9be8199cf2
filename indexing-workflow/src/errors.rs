use thiserror::Error;

use kg_store::StoreError;
use repo_clone_service::CloneError;

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Stage-level workflow failures.
///
/// Classification drives the driver: retryable failures go through the
/// backoff policy, everything else aborts the workflow immediately.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    /// Repository parsing / graph construction failed at stage level.
    #[error("parsing failed: {0}")]
    Parse(String),

    /// Graph or metadata persistence failed.
    #[error("graph persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// External cancellation; bubbles unchanged.
    #[error("workflow cancelled")]
    Cancelled,

    /// A background task died before producing a result.
    #[error("task failed: {0}")]
    Task(String),
}

impl WorkflowError {
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Clone(e) => e.is_retryable(),
            WorkflowError::Parse(_) => true,
            WorkflowError::Persistence(_) => true,
            WorkflowError::Cancelled => false,
            WorkflowError::Task(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_classification_carries_through() {
        let auth = WorkflowError::Clone(CloneError::NonRetryable("403".into()));
        assert!(!auth.is_retryable());

        let network = WorkflowError::Clone(CloneError::Retryable("reset".into()));
        assert!(network.is_retryable());

        let sha = WorkflowError::Clone(CloneError::ShaValidation {
            expected: "a".repeat(40),
            actual: "b".repeat(40),
        });
        assert!(!sha.is_retryable());

        let size = WorkflowError::Clone(CloneError::ResourceExhausted {
            size_mb: 2000,
            limit_mb: 1000,
        });
        assert!(!size.is_retryable());
    }

    #[test]
    fn cancellation_is_never_retried() {
        assert!(!WorkflowError::Cancelled.is_retryable());
    }
}
