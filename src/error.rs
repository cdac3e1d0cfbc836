//! Error types for document store operations

use thiserror::Error;

/// Errors that can occur during document store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Missing query parameter: {0}")]
    MissingParameter(String),

    /// A generated statement could not be prepared or executed
    #[error("Statement failed: {source} (sql: {sql})")]
    Statement {
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not generate an unused identifier after {attempts} attempts")]
    IdGenerationExhausted { attempts: u32 },

    #[error("The factory that created this document no longer exists")]
    FactoryUnavailable,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    pub fn statement(sql: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Statement {
            sql: sql.into(),
            source,
        }
    }

    /// True when the error is a uniqueness-constraint violation reported by the backend
    pub fn is_unique_violation(&self) -> bool {
        let source = match self {
            Self::Statement { source, .. } => source,
            Self::Sql(source) => source,
            _ => return false,
        };
        matches!(source, sqlx::Error::Database(db) if db.is_unique_violation())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_carries_sql() {
        let err = StoreError::statement("SELECT nope", sqlx::Error::RowNotFound);
        let message = err.to_string();
        assert!(message.contains("SELECT nope"));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_id_exhaustion_message() {
        let err = StoreError::IdGenerationExhausted { attempts: 10 };
        assert!(err.to_string().contains("10 attempts"));
    }
}
