//! YouTube upload: OAuth credentials on disk and the resumable upload protocol.

pub mod credentials;
pub mod resumable;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::retry::Retryable;

pub use credentials::{AuthorizedUserToken, OAuthClientSecrets, YouTubeAuth};
pub use resumable::YouTubeUploader;

#[derive(Error, Debug)]
pub enum UploadError {
    /// No usable credentials; the owner has to run the OAuth flow
    #[error("YouTube authorization required: {0}")]
    Unauthorized(String),

    #[error("YouTube API returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("No longer attempting to retry after {retries} retries: {last_error}")]
    RetriesExhausted { retries: u32, last_error: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected upload response: {0}")]
    Protocol(String),
}

impl UploadError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl Retryable for UploadError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                crate::config::upload::RETRIABLE_STATUS_CODES.contains(&status.as_u16())
            }
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Io(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Title and description sent with the video snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
}

/// A video waiting for the owner to finish authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub video: PathBuf,
    pub metadata: VideoMetadata,
}

/// Publishes a rendered video and returns the platform's id.
#[async_trait]
pub trait VideoUploader: Send + Sync {
    async fn upload(&self, video: &Path, metadata: &VideoMetadata) -> Result<String, UploadError>;
}

/// Public watch URL for an uploaded video.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
