//! YouTube Data API resumable upload.
//!
//! The session is opened with a metadata POST; chunks are then PUT to the
//! session URI with `Content-Range`. A 308 reply carries the confirmed byte
//! range, a 200/201 reply carries the video resource.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{UploadError, VideoMetadata, VideoUploader, YouTubeAuth};
use crate::config;
use crate::core::metrics::UPLOAD_RETRIES_TOTAL;
use crate::core::retry::{RetryConfig, Retryable, Sleeper, TokioSleeper};
use crate::core::utils::truncate_chars;

const TITLE_MAX_CHARS: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 5000;
const PERMANENT_REDIRECT: u16 = 308;

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

/// Outcome of one chunk PUT.
enum ChunkReply {
    /// Server has bytes `0..next_offset`
    Incomplete(u64),
    Done(String),
}

pub struct YouTubeUploader {
    http: reqwest::Client,
    auth: YouTubeAuth,
    api_base: String,
    chunk_size: usize,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl YouTubeUploader {
    pub fn new(auth: YouTubeAuth, api_base: impl Into<String>) -> Result<Self, UploadError> {
        // 308 is the protocol's "resume incomplete", never a redirect to follow
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            auth,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            chunk_size: config::upload::CHUNK_SIZE,
            retry: RetryConfig::resumable_upload(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn from_env(auth: YouTubeAuth) -> Result<Self, UploadError> {
        Self::new(auth, config::upload::API_BASE.as_str())
    }

    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn auth(&self) -> &YouTubeAuth {
        &self.auth
    }

    async fn start_session(&self, token: &SecretString, metadata: &VideoMetadata, total: u64) -> Result<String, UploadError> {
        let body = json!({
            "snippet": {
                "title": truncate_chars(&metadata.title, TITLE_MAX_CHARS),
                "description": truncate_chars(&metadata.description, DESCRIPTION_MAX_CHARS),
                "categoryId": config::upload::CATEGORY_ID,
            },
            "status": {
                "privacyStatus": config::upload::PRIVACY_STATUS,
            }
        });

        let response = self
            .http
            .post(format!("{}/upload/youtube/v3/videos", self.api_base))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token.expose_secret())
            .header("X-Upload-Content-Length", total.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UploadError::Unauthorized("access token rejected".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status { status, body });
        }

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Protocol("session response has no Location header".to_string()))
    }

    async fn read_chunk(&self, video: &Path, offset: u64, total: u64) -> Result<Vec<u8>, UploadError> {
        if offset >= total {
            return Err(UploadError::Protocol(format!("offset {} is past the end of the file", offset)));
        }
        let len = (total - offset).min(self.chunk_size as u64) as usize;
        let mut file = fs_err::tokio::File::open(video).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    async fn put_chunk(&self, session: &str, token: &SecretString, chunk: Vec<u8>, offset: u64, total: u64) -> Result<ChunkReply, UploadError> {
        let end = offset + chunk.len() as u64 - 1;
        log::debug!("Uploading bytes {}-{}/{}", offset, end, total);

        let response = self
            .http
            .put(session)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, total))
            .body(chunk)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == PERMANENT_REDIRECT {
            let next = response
                .headers()
                .get(reqwest::header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range_end)
                .map_or(0, |last| last + 1);
            return Ok(ChunkReply::Incomplete(next));
        }
        if status.is_success() {
            let video: VideoResource = response.json().await?;
            return Ok(ChunkReply::Done(video.id));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UploadError::Unauthorized("access token rejected".to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status { status, body })
    }

    /// Opens the session if needed and sends the chunk at `offset`.
    async fn step(
        &self,
        session: Option<String>,
        token: &SecretString,
        video: &Path,
        metadata: &VideoMetadata,
        offset: u64,
        total: u64,
    ) -> Result<(String, ChunkReply), UploadError> {
        let uri = match session {
            Some(uri) => uri,
            None => self.start_session(token, metadata, total).await?,
        };
        let chunk = self.read_chunk(video, offset, total).await?;
        let reply = self.put_chunk(&uri, token, chunk, offset, total).await?;
        Ok((uri, reply))
    }
}

/// Last confirmed byte from a `Range: bytes=0-N` header.
fn parse_range_end(header: &str) -> Option<u64> {
    header.trim().strip_prefix("bytes=")?.split('-').nth(1)?.trim().parse().ok()
}

#[async_trait]
impl VideoUploader for YouTubeUploader {
    async fn upload(&self, video: &Path, metadata: &VideoMetadata) -> Result<String, UploadError> {
        log::info!(
            "Starting uploading video {} with title {} to category {} with privacy {}",
            video.display(),
            metadata.title,
            config::upload::CATEGORY_ID,
            config::upload::PRIVACY_STATUS
        );

        let total = fs_err::tokio::metadata(video).await?.len();
        if total == 0 {
            return Err(UploadError::Protocol(format!("{} is empty", video.display())));
        }
        let mut token = self.auth.access_token().await?;
        let mut token_refreshed = false;

        let mut session: Option<String> = None;
        let mut offset: u64 = 0;
        let mut retry: u32 = 0;

        loop {
            let result = self.step(session.clone(), &token, video, metadata, offset, total).await;
            let error = match result {
                Ok((uri, ChunkReply::Done(id))) => {
                    log::info!("🎥 Video id '{}' was successfully uploaded via {}", id, uri);
                    return Ok(id);
                }
                Ok((uri, ChunkReply::Incomplete(next))) if next > offset => {
                    session = Some(uri);
                    offset = next;
                    continue;
                }
                Ok((uri, ChunkReply::Incomplete(next))) => {
                    session = Some(uri);
                    offset = next;
                    UploadError::Protocol(format!("server confirmed only {} of {} bytes", next, total))
                }
                // The token may have been revoked or expired mid-upload
                Err(e) if e.is_unauthorized() && !token_refreshed => {
                    log::warn!("Access token rejected, refreshing once: {}", e);
                    token = self.auth.refreshed_token().await?;
                    token_refreshed = true;
                    continue;
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => {
                    log::error!("Non-retriable upload error: {}", e);
                    return Err(e);
                }
            };

            log::warn!("A retriable error occurred: {}", error);
            retry += 1;
            if retry > self.retry.max_retries {
                log::error!("No longer attempting to retry.");
                return Err(UploadError::RetriesExhausted {
                    retries: self.retry.max_retries,
                    last_error: error.to_string(),
                });
            }

            UPLOAD_RETRIES_TOTAL.inc();
            let delay = self.retry.delay_for_attempt(retry);
            log::warn!("Sleeping {:.2} seconds and then retrying...", delay.as_secs_f64());
            self.sleeper.sleep(delay).await;
        }
    }
}
