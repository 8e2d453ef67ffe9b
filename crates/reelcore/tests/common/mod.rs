//! Fakes shared by the reelcore integration tests
//!
//! Every external collaborator of the pipeline (diffusion backend, LLM, TTS,
//! ffmpeg, Telegram, YouTube) has an in-memory stand-in here.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use reelcore::compose::{Compositor, ConversionError, ConversionResult, FramePlan};
use reelcore::core::retry::Sleeper;
use reelcore::core::utils::save_next;
use reelcore::diffusion::{ImageBackend, Img2ImgParams, Sampler, SdApiError, Txt2ImgParams};
use reelcore::llm::{ChatModel, ChatRequest, LlmError};
use reelcore::pipeline::{Delivery, DeliveryError};
use reelcore::speech::{SpeechError, SpeechSynth};
use reelcore::upload::{UploadError, VideoMetadata, VideoUploader};

/// Small solid-color PNG; the red channel tags the image.
pub fn png(tag: u8) -> Vec<u8> {
    let img = RgbaImage::from_pixel(16, 24, Rgba([tag, 40, 90, 255]));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png).unwrap();
    buffer
}

/// Diffusion backend that returns tagged PNGs and records img2img inputs.
#[derive(Default)]
pub struct FakeImageBackend {
    /// Every init image img2img was called with, in order
    pub inputs: Mutex<Vec<Vec<u8>>>,
    /// Every image img2img returned, in order
    pub outputs: Mutex<Vec<Vec<u8>>>,
    /// 1-based img2img calls that return no images
    pub empty_at: Vec<usize>,
    /// 1-based img2img call that fails
    pub fail_at: Option<usize>,
    pub calls: Mutex<usize>,
}

impl FakeImageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn img2img_calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ImageBackend for FakeImageBackend {
    async fn samplers(&self) -> Result<Vec<Sampler>, SdApiError> {
        Ok(vec![Sampler {
            name: "Euler a".to_string(),
            ..Default::default()
        }])
    }

    async fn txt2img(&self, _params: &Txt2ImgParams) -> Result<Vec<Vec<u8>>, SdApiError> {
        Ok(vec![png(0)])
    }

    async fn img2img(&self, _params: &Img2ImgParams, init_images: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, SdApiError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        self.inputs.lock().unwrap().push(init_images[0].clone());

        if self.fail_at == Some(call) {
            return Err(SdApiError::InvalidResponse("backend exploded".to_string()));
        }
        if self.empty_at.contains(&call) {
            return Ok(Vec::new());
        }

        let image = png(call as u8);
        self.outputs.lock().unwrap().push(image.clone());
        Ok(vec![image])
    }
}

/// LLM that answers every request with the same text.
pub struct FakeChat(pub String);

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
        Ok(self.0.clone())
    }
}

/// TTS that returns a fixed WAV-ish payload.
pub struct FakeSpeech;

#[async_trait]
impl SpeechSynth for FakeSpeech {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>, SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }
        Ok(b"RIFF\0\0\0\0WAVEfmt ".to_vec())
    }
}

/// Compositor that writes a placeholder file and reports scripted durations.
pub struct FakeCompositor {
    output_dir: PathBuf,
    durations: Mutex<VecDeque<f64>>,
    /// Frame plans received by `compile`
    pub plans: Mutex<Vec<FramePlan>>,
    /// Pretend ffmpeg succeeded but produced nothing
    pub skip_write: bool,
}

impl FakeCompositor {
    pub fn new(output_dir: impl Into<PathBuf>, durations: impl IntoIterator<Item = f64>) -> Self {
        Self {
            output_dir: output_dir.into(),
            durations: Mutex::new(durations.into_iter().collect()),
            plans: Mutex::new(Vec::new()),
            skip_write: false,
        }
    }
}

#[async_trait]
impl Compositor for FakeCompositor {
    async fn compile(&self, plan: &FramePlan, audio: &Path) -> ConversionResult<PathBuf> {
        if !audio.exists() {
            return Err(ConversionError::InputNotFound(audio.display().to_string()));
        }
        self.plans.lock().unwrap().push(plan.clone());
        if self.skip_write {
            return Ok(self.output_dir.join("video_missing.mp4"));
        }
        Ok(save_next(&self.output_dir, "video_", ".mp4", b"mp4").await?)
    }

    async fn probe_duration(&self, _video: &Path) -> ConversionResult<f64> {
        self.durations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ConversionError::FfmpegError("no scripted duration left".to_string()))
    }
}

/// Everything the pipeline sent to the chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message(String),
    Video(PathBuf, String),
    MediaGroup(Vec<PathBuf>),
    Audio(PathBuf),
}

#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<Sent>>,
    pub fail_video: bool,
}

impl RecordingDelivery {
    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Message(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn videos(&self) -> Vec<PathBuf> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Video(path, _) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send_message(&self, _chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Message(text.to_string()));
        Ok(())
    }

    async fn send_video(&self, _chat_id: i64, video: &Path, caption: &str) -> Result<(), DeliveryError> {
        if self.fail_video {
            return Err(DeliveryError("Request Entity Too Large".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Video(video.to_path_buf(), caption.to_string()));
        Ok(())
    }

    async fn send_media_group(&self, _chat_id: i64, images: &[PathBuf]) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::MediaGroup(images.to_vec()));
        Ok(())
    }

    async fn send_audio(&self, _chat_id: i64, audio: &Path) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Audio(audio.to_path_buf()));
        Ok(())
    }
}

/// Uploader with a scripted result.
pub enum FakeUploader {
    Ok(String),
    Unauthorized,
    Fails,
}

#[async_trait]
impl VideoUploader for FakeUploader {
    async fn upload(&self, _video: &Path, _metadata: &VideoMetadata) -> Result<String, UploadError> {
        match self {
            Self::Ok(id) => Ok(id.clone()),
            Self::Unauthorized => Err(UploadError::Unauthorized("token.json not found".to_string())),
            Self::Fails => Err(UploadError::Status {
                status: reqwest::StatusCode::FORBIDDEN,
                body: "quotaExceeded".to_string(),
            }),
        }
    }
}

/// Sleeper that records delays instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn count(&self) -> usize {
        self.delays.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
