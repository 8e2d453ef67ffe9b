//! Resumable upload against a wiremock YouTube endpoint
//!
//! Run with: cargo test -p reelcore --test upload_test

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::RecordingSleeper;
use pretty_assertions::assert_eq;
use reelcore::upload::{AuthorizedUserToken, UploadError, VideoMetadata, VideoUploader, YouTubeAuth, YouTubeUploader};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOTAL: usize = 100;
const CHUNK: usize = 10;

async fn write_token(dir: &Path) -> PathBuf {
    write_token_with(dir, "ya29.test", "http://127.0.0.1:9/token").await
}

async fn write_token_with(dir: &Path, access_token: &str, token_uri: &str) -> PathBuf {
    let token_file = dir.join("token.json");
    AuthorizedUserToken {
        token: Some(access_token.to_string()),
        refresh_token: Some("1//refresh".to_string()),
        token_uri: token_uri.to_string(),
        client_id: "cid".to_string(),
        client_secret: "secret".to_string(),
        scopes: vec![],
        expiry: Some(Utc::now() + chrono::Duration::hours(1)),
    }
    .save(&token_file)
    .await
    .unwrap();
    token_file
}

async fn write_video(dir: &Path) -> PathBuf {
    let video = dir.join("video_0.mp4");
    tokio::fs::write(&video, vec![7u8; TOTAL]).await.unwrap();
    video
}

fn metadata() -> VideoMetadata {
    VideoMetadata {
        title: "ШОК! Кот в неоне 🤯".to_string(),
        description: "Неоновый город медленно просыпается.".to_string(),
    }
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(query_param("uploadType", "resumable"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(body_partial_json(serde_json::json!({
            "snippet": {"categoryId": "22", "title": "ШОК! Кот в неоне 🤯"},
            "status": {"privacyStatus": "public"}
        })))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Location", format!("{}/upload/session/abc", server.uri()).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// 308 for every chunk but the last, which returns the video resource.
async fn mount_chunks(server: &MockServer) {
    for start in (0..TOTAL).step_by(CHUNK) {
        let end = start + CHUNK - 1;
        let response = if end + 1 == TOTAL {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "dQw4w9WgXcQ"}))
        } else {
            ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{}", end).as_str())
        };
        Mock::given(method("PUT"))
            .and(path("/upload/session/abc"))
            .and(header("content-range", format!("bytes {}-{}/{}", start, end, TOTAL).as_str()))
            .respond_with(response)
            .mount(server)
            .await;
    }
}

async fn uploader(server: &MockServer, dir: &Path, sleeper: Arc<RecordingSleeper>) -> YouTubeUploader {
    let token_file = write_token(dir).await;
    let auth = YouTubeAuth::new(reqwest::Client::new(), token_file, dir.join("client_secrets.json"));
    YouTubeUploader::new(auth, server.uri())
        .unwrap()
        .chunk_size(CHUNK)
        .with_sleeper(sleeper)
}

#[tokio::test]
async fn test_retriable_error_on_chunk_three_is_retried() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_session(&server).await;
    // Mounted first so it wins once for the third chunk
    Mock::given(method("PUT"))
        .and(path("/upload/session/abc"))
        .and(header("content-range", "bytes 20-29/100"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend error"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_chunks(&server).await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let uploader = uploader(&server, dir.path(), sleeper.clone()).await;
    let video = write_video(dir.path()).await;

    let id = uploader.upload(&video, &metadata()).await.unwrap();

    assert_eq!(id, "dQw4w9WgXcQ");
    let delays = sleeper.delays.lock().unwrap().clone();
    assert_eq!(delays.len(), 1);
    // random() * 2^1
    assert!(delays[0] <= Duration::from_secs(2));

    // One session POST, ten chunks, one repeated third chunk
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 12);
}

#[tokio::test]
async fn test_non_retriable_status_fails_without_sleeping() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/abc"))
        .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let uploader = uploader(&server, dir.path(), sleeper.clone()).await;
    let video = write_video(dir.path()).await;

    let err = uploader.upload(&video, &metadata()).await.unwrap_err();

    assert!(matches!(err, UploadError::Status { status, .. } if status == reqwest::StatusCode::FORBIDDEN));
    assert_eq!(sleeper.count(), 0);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/abc"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let uploader = uploader(&server, dir.path(), sleeper.clone()).await;
    let video = write_video(dir.path()).await;

    let err = uploader.upload(&video, &metadata()).await.unwrap_err();

    assert!(matches!(err, UploadError::RetriesExhausted { retries: 10, .. }));
    assert_eq!(sleeper.count(), 10);
    for (retry, delay) in sleeper.delays.lock().unwrap().iter().enumerate() {
        assert!(*delay <= Duration::from_secs(2u64.pow(retry as u32 + 1)));
    }
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_before_any_request() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = YouTubeAuth::new(
        reqwest::Client::new(),
        dir.path().join("token.json"),
        dir.path().join("client_secrets.json"),
    );
    let uploader = YouTubeUploader::new(auth, server.uri()).unwrap();
    let video = write_video(dir.path()).await;

    let err = uploader.upload(&video, &metadata()).await.unwrap_err();

    assert!(err.is_unauthorized());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_chunk_upload() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/abc"))
        .and(header("content-range", "bytes 0-99/100"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "one"})))
        .expect(1)
        .mount(&server)
        .await;

    let token_file = write_token(dir.path()).await;
    let auth = YouTubeAuth::new(reqwest::Client::new(), token_file, dir.path().join("client_secrets.json"));
    let uploader = YouTubeUploader::new(auth, server.uri()).unwrap();
    let video = write_video(dir.path()).await;

    assert_eq!(uploader.upload(&video, &metadata()).await.unwrap(), "one");
}

/// Session endpoint that only accepts `ya29.fresh`, plus a token endpoint handing it out.
async fn mount_token_rotation(server: &MockServer, refreshes: u64, issued: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": issued,
            "expires_in": 3600
        })))
        .expect(refreshes)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .and(header("authorization", "Bearer ya29.fresh"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Location", format!("{}/upload/session/abc", server.uri()).as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_token_rotation(&server, 1, "ya29.fresh").await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/abc"))
        .and(header("authorization", "Bearer ya29.fresh"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "fresh"})))
        .expect(1)
        .mount(&server)
        .await;

    let token_file = write_token_with(dir.path(), "ya29.revoked", &format!("{}/token", server.uri())).await;
    let auth = YouTubeAuth::new(reqwest::Client::new(), token_file.clone(), dir.path().join("client_secrets.json"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let uploader = YouTubeUploader::new(auth, server.uri()).unwrap().with_sleeper(sleeper.clone());
    let video = write_video(dir.path()).await;

    assert_eq!(uploader.upload(&video, &metadata()).await.unwrap(), "fresh");
    assert_eq!(sleeper.count(), 0);

    let saved = AuthorizedUserToken::load(&token_file).await.unwrap().unwrap();
    assert_eq!(saved.token.as_deref(), Some("ya29.fresh"));
}

#[tokio::test]
async fn test_token_rejected_after_refresh_is_unauthorized() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_token_rotation(&server, 1, "ya29.still-bad").await;

    let token_file = write_token_with(dir.path(), "ya29.revoked", &format!("{}/token", server.uri())).await;
    let auth = YouTubeAuth::new(reqwest::Client::new(), token_file, dir.path().join("client_secrets.json"));
    let uploader = YouTubeUploader::new(auth, server.uri()).unwrap();
    let video = write_video(dir.path()).await;

    let err = uploader.upload(&video, &metadata()).await.unwrap_err();

    assert!(err.is_unauthorized());
    let sessions = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/upload/youtube/v3/videos")
        .count();
    assert_eq!(sessions, 2);
}
