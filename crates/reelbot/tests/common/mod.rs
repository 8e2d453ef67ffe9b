//! Common test utilities
//!
//! A wiremock server that answers the Bot API methods the bot uses, and
//! in-memory stand-ins for the pipeline's collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use reelcore::diffusion::{ImageBackend, Img2ImgParams, Sampler, SdApiError, Txt2ImgParams};
use reelcore::pipeline::{Delivery, DeliveryError};
use reelcore::upload::{UploadError, VideoMetadata, VideoUploader};
use serde_json::{json, Value};
use teloxide::Bot;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_CHAT_ID: i64 = 123_456_789;

fn chat_json() -> Value {
    json!({ "id": TEST_CHAT_ID, "type": "private", "first_name": "Test" })
}

fn bot_user_json() -> Value {
    json!({ "id": 42, "is_bot": true, "first_name": "Reel", "username": "reel_test_bot" })
}

pub fn text_message_json(message_id: i32, text: &str) -> Value {
    json!({
        "message_id": message_id,
        "date": 1_700_000_000,
        "chat": chat_json(),
        "from": bot_user_json(),
        "text": text,
    })
}

pub fn photo_message_json(message_id: i32) -> Value {
    json!({
        "message_id": message_id,
        "date": 1_700_000_000,
        "chat": chat_json(),
        "from": bot_user_json(),
        "photo": [{
            "file_id": "photo-file",
            "file_unique_id": "photo-unique",
            "width": 64,
            "height": 96,
            "file_size": 128,
        }],
    })
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
}

/// Bot API mock with canned answers for the methods under test.
pub struct TelegramMock {
    pub server: MockServer,
}

impl TelegramMock {
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/bot[^/]+/sendMessage$"))
            .respond_with(ok(text_message_json(1, "ok")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/bot[^/]+/sendPhoto$"))
            .respond_with(ok(photo_message_json(2)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/bot[^/]+/sendMediaGroup$"))
            .respond_with(ok(json!([photo_message_json(3), photo_message_json(4)])))
            .mount(&server)
            .await;

        Self { server }
    }

    /// The next `times` calls to `api_method` answer with a Bot API error.
    pub async fn fail_next(&self, api_method: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path_regex(format!(r"^/bot[^/]+/{}$", api_method)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: group send failed",
            })))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    pub fn bot(&self) -> Bot {
        Bot::new("test_token_12345:ABCDEF").set_api_url(self.server.uri().parse().unwrap())
    }

    /// Bot API method names, in the order they were called.
    pub async fn calls(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| request.url.path().rsplit('/').next().map(str::to_string))
            .collect()
    }

    pub async fn bodies_of(&self, api_method: &str) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path().ends_with(api_method))
            .map(|request| String::from_utf8_lossy(&request.body).into_owned())
            .collect()
    }
}

/// Writes `count` small files that pass for images.
pub fn write_images(dir: &Path, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| {
            let path = dir.join(format!("image_{}.png", i));
            std::fs::write(&path, [0x89, b'P', b'N', b'G', i as u8]).unwrap();
            path
        })
        .collect()
}

/// Delivery that only records what it was asked to send.
#[derive(Default)]
pub struct RecordingDelivery {
    pub messages: Mutex<Vec<(i64, String)>>,
}

impl RecordingDelivery {
    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|(_, text)| text.clone()).collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.messages.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_video(&self, _chat_id: i64, _video: &Path, _caption: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_media_group(&self, _chat_id: i64, _images: &[PathBuf]) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_audio(&self, _chat_id: i64, _audio: &Path) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Uploader that must never be reached.
pub struct UnreachableUploader;

#[async_trait]
impl VideoUploader for UnreachableUploader {
    async fn upload(&self, video: &Path, _metadata: &VideoMetadata) -> Result<String, UploadError> {
        panic!("unexpected upload of {}", video.display());
    }
}

/// Diffusion backend that returns `images` blobs per txt2img call.
pub struct FakeImageBackend {
    pub samplers: Vec<&'static str>,
    pub images: usize,
    pub requests: Mutex<Vec<Txt2ImgParams>>,
}

impl FakeImageBackend {
    pub fn new(samplers: Vec<&'static str>, images: usize) -> Self {
        Self {
            samplers,
            images,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ImageBackend for FakeImageBackend {
    async fn samplers(&self) -> Result<Vec<Sampler>, SdApiError> {
        Ok(self
            .samplers
            .iter()
            .map(|name| Sampler {
                name: name.to_string(),
                ..Default::default()
            })
            .collect())
    }

    async fn txt2img(&self, params: &Txt2ImgParams) -> Result<Vec<Vec<u8>>, SdApiError> {
        self.requests.lock().unwrap().push(params.clone());
        Ok((0..self.images).map(|i| vec![i as u8; 8]).collect())
    }

    async fn img2img(&self, _params: &Img2ImgParams, _init_images: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, SdApiError> {
        Err(SdApiError::InvalidResponse("img2img is not used here".to_string()))
    }
}
