use super::index::IndexError;
use super::query::ValidationError;

/// Error raised by a search request. Any index failure aborts the whole request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("index round trip '{operation}' exceeded {timeout_ms}ms")]
    IndexTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("search cancelled")]
    Cancelled,
}

impl From<IndexError> for SearchError {
    fn from(value: IndexError) -> Self {
        match value {
            IndexError::Unavailable(reason) => SearchError::IndexUnavailable(reason),
            IndexError::Rejected(reason) => SearchError::IndexUnavailable(reason),
        }
    }
}
