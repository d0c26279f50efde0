use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Validation failed{}: {field} {message}", index_suffix(.index))]
    Validation {
        index: Option<usize>,
        field: String,
        message: String,
    },

    #[error("Connection failed: {cause}")]
    ConnectionFailed { cause: String },

    #[error("Query failed in {operation}: {cause}")]
    QueryFailed { operation: String, cause: String },

    #[error("Invalid identifier: {name}")]
    InvalidIdentifier { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        StorageError::Validation {
            index: None,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn query(operation: &str, err: impl std::fmt::Display) -> Self {
        StorageError::QueryFailed {
            operation: operation.to_string(),
            cause: err.to_string(),
        }
    }

    /// Attach the position of the offending record within a batch
    pub fn at_index(self, position: usize) -> Self {
        match self {
            StorageError::Validation { field, message, .. } => StorageError::Validation {
                index: Some(position),
                field,
                message,
            },
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation { .. })
    }
}

fn index_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" for record {}", i),
        None => String::new(),
    }
}

impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StorageError::ConnectionFailed {
            cause: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Internal(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = StorageError::validation("symbol", "must not be empty");
        assert_eq!(err.to_string(), "Validation failed: symbol must not be empty");
    }

    #[test]
    fn test_validation_message_with_index() {
        let err = StorageError::validation("close", "must be >= 0").at_index(3);
        assert_eq!(
            err.to_string(),
            "Validation failed for record 3: close must be >= 0"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_at_index_leaves_other_errors() {
        let err = StorageError::query("upsert", "duplicate key").at_index(1);
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "Query failed in upsert: duplicate key");
    }
}
