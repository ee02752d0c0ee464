//! Sample source error types

use thiserror::Error;

/// Errors raised by a sample source
///
/// The evaluator never interprets these; they reach the caller unchanged.
#[derive(Error, Debug)]
pub enum FetchError {
    /// No channel with this name exists in the archive
    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// The archive cannot be reached or is not usable
    #[error("Archive unavailable: {0}")]
    Unavailable(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Sample file could not be read
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for sample source operations
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::VariableNotFound("IBCAD00CRCUR6".to_string());
        assert_eq!(err.to_string(), "Variable not found: IBCAD00CRCUR6");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let fetch_err: FetchError = io_err.into();
        assert!(matches!(fetch_err, FetchError::Io(_)));
    }
}
