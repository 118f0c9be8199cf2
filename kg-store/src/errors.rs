use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any graph-database round trip that failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}
