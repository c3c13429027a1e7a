//! Error types shared across the server

use thiserror::Error;

use crate::auth::AuthError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures of the event log or the store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event log corrupted at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Result type for write paths and catch-up
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced to the caller of a write path or a connection
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl ChatError {
    /// Short machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Auth(_) => "UNAUTHORIZED",
            ChatError::Storage(StorageError::NotFound(_)) => "NOT_FOUND",
            ChatError::Storage(StorageError::Conflict(_)) => "CONFLICT",
            ChatError::Storage(StorageError::Invalid(_)) | ChatError::Validation(_) => {
                "BAD_REQUEST"
            }
            ChatError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ChatError::from(StorageError::NotFound("room".to_string()));
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "room not found");

        let err = ChatError::Validation("empty".to_string());
        assert_eq!(err.code(), "BAD_REQUEST");

        let err = ChatError::from(AuthError::MissingToken);
        assert_eq!(err.code(), "UNAUTHORIZED");

        let err = ChatError::from(StorageError::Corrupted {
            line: 3,
            reason: "bad json".to_string(),
        });
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(err.to_string().contains("line 3"));
    }
}
