//! Error types for zeekagent-queries

use thiserror::Error;
use zeekagent_commons::QueryId;
use zeekagent_store::StorageError;

/// Errors returned by the query tracker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate query id: {0}")]
    DuplicateId(QueryId),

    #[error("Query '{query}' is already scheduled as {existing}")]
    DuplicateScheduleQuery { query: String, existing: QueryId },

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("Scheduler rejected configuration: {0}")]
    SchedulerRejected(String),

    #[error("Query id space exhausted at {0}")]
    IdSpaceExhausted(u64),
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound(_))
    }
}

/// Result type for query tracker operations
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts() {
        let err: QueryError = StorageError::IoError("disk full".to_string()).into();
        assert_eq!(err.to_string(), "Store error: I/O error: disk full");
    }

    #[test]
    fn test_duplicate_schedule_message() {
        let err = QueryError::DuplicateScheduleQuery {
            query: "SELECT 1".to_string(),
            existing: QueryId::new("3"),
        };
        assert_eq!(err.to_string(), "Query 'SELECT 1' is already scheduled as 3");
        assert!(!err.is_not_found());
    }
}
