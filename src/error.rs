use thiserror::Error;

/// Main error type for entitytrace
#[derive(Error, Debug)]
pub enum TraceError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failures
    #[error("HTTP error: {0}")]
    Http(String),

    /// Person/place lookup failures (transient, recovered per node)
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Seed entity extraction failures
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Bulk person/connection load failures (fatal to the path engine)
    #[error("Bulk load error: {0}")]
    BulkLoad(String),

    /// Answer submission failures
    #[error("Report error: {0}")]
    Report(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using TraceError
pub type Result<T> = std::result::Result<T, TraceError>;
