use thiserror::Error;

/// Centralized error type for storage, IO and glue code.
///
/// Domain clients (diffusion, speech, upload, ...) have their own error
/// enums; they convert into this one at the boundaries where callers don't
/// care about the specific failure.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// HTTP/transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External process failures (ffmpeg, ffprobe)
    #[error("Process error: {0}")]
    Process(String),

    /// Zip archive errors
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
