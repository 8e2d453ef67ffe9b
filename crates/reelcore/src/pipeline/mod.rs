//! Video generation orchestrator.
//!
//! One cycle: prompt → base image → img2img chain → cover and title →
//! narration → ffmpeg. The scheduled run repeats whole cycles until the
//! rendered duration lands inside the accepted window, then delivers the
//! result and optionally uploads it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use thiserror::Error;

use crate::compose::{Compositor, ConversionError, FramePlan};
use crate::config;
use crate::core::metrics::{PIPELINE_ATTEMPTS_TOTAL, PIPELINE_DURATION_SECONDS};
use crate::core::utils::{remove_files, save_next};
use crate::cover::{CoverError, CoverGenerator};
use crate::diffusion::{generate_sequential_variations, ChainConfig, ImageBackend, SdApiError, Txt2ImgParams};
use crate::prompt::PromptGenerator;
use crate::speech::{NarrationGenerator, SpeechError};
use crate::upload::{watch_url, PendingUpload, UploadError, VideoMetadata, VideoUploader};

pub const START_MESSAGE: &str = "⏳ Начинаю генерацию видео...";
pub const VIDEO_CAPTION: &str = "🎥 Видео сгенерировано!";
pub const WRONG_DURATION_MESSAGE: &str = "⚠️ Длина видео не соответствует требованиям. Повторяю генерацию...";
pub const AUTH_REQUIRED_MESSAGE: &str =
    "🔑 Требуется авторизация YouTube. Пожалуйста, пройдите процесс авторизации кнопкой «🔑 Авторизация YouTube».";

#[derive(Error, Debug)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Where the pipeline sends its results; implemented by the Telegram layer.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;

    async fn send_video(&self, chat_id: i64, video: &Path, caption: &str) -> Result<(), DeliveryError>;

    /// Sends images in groups of ten.
    async fn send_media_group(&self, chat_id: i64, images: &[PathBuf]) -> Result<(), DeliveryError>;

    async fn send_audio(&self, chat_id: i64, audio: &Path) -> Result<(), DeliveryError>;
}

#[derive(Error, Debug, strum::IntoStaticStr)]
pub enum PipelineError {
    #[error("expected file not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("image generation failed: {0}")]
    Image(#[from] SdApiError),

    #[error("narration failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("cover generation failed: {0}")]
    Cover(#[from] CoverError),

    #[error("video compilation failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no acceptable video after {0} attempts")]
    AttemptsExhausted(u32),
}

impl PipelineError {
    /// Metric label for a failed cycle
    fn outcome(&self) -> &'static str {
        match self {
            Self::MissingArtifact(_) => "missing_artifact",
            _ => "failed",
        }
    }

    /// Chat report for a failed cycle.
    pub fn report(&self) -> String {
        let kind: &'static str = self.into();
        format!("🚨 Критическая ошибка генерации:\n• Тип: {}\n• Сообщение: {}", kind, self)
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVideo {
    pub video: PathBuf,
    /// Cover, base image, then the variations in chain order
    pub images: Vec<PathBuf>,
    pub audio: PathBuf,
    pub title: String,
    /// Narration text, reused as the upload description
    pub description: String,
}

impl GeneratedVideo {
    pub fn working_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::with_capacity(self.images.len() + 2);
        files.push(self.video.clone());
        files.extend(self.images.iter().cloned());
        files.push(self.audio.clone());
        files
    }

    pub fn pending_upload(&self) -> PendingUpload {
        PendingUpload {
            video: self.video.clone(),
            metadata: VideoMetadata {
                title: self.title.clone(),
                description: self.description.clone(),
            },
        }
    }
}

/// What happened to the upload after a scheduled run.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Skipped,
    Uploaded(String),
    /// The owner must authorize first; the video is kept for later
    NeedsAuth(PendingUpload),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledRun {
    pub video: GeneratedVideo,
    pub upload: UploadOutcome,
}

/// True when `seconds` is strictly inside the accepted window.
pub fn is_accepted_duration(seconds: f64) -> bool {
    let minutes = seconds / 60.0;
    config::video::MIN_DURATION_MINUTES < minutes && minutes < config::video::MAX_DURATION_MINUTES
}

#[derive(Builder)]
pub struct VideoPipeline {
    prompts: PromptGenerator,
    images: Arc<dyn ImageBackend>,
    chain: ChainConfig,
    cover: CoverGenerator,
    narration: NarrationGenerator,
    compositor: Arc<dyn Compositor>,
    /// Base images are saved here as image_N.png
    #[builder(into)]
    generated_dir: PathBuf,
    #[builder(default = 10)]
    max_attempts: u32,
}

impl VideoPipeline {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn base_image(&self, prompt: &str) -> Result<PathBuf, PipelineError> {
        let mut params = Txt2ImgParams::with_prompt(prompt);
        match self.images.samplers().await {
            Ok(samplers) => params.apply_sampler_fallback(&samplers),
            Err(e) => log::warn!("Could not list samplers, keeping {}: {}", params.sampler_name, e),
        }

        let first = self
            .images
            .txt2img(&params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::MissingArtifact(self.generated_dir.join("image_N.png")))?;
        let path = save_next(&self.generated_dir, "image_", ".png", &first).await?;
        log::info!("🖼 Base image saved to {}", path.display());
        Ok(path)
    }

    /// Runs one full cycle. Files produced before a failure are pushed to `produced`.
    async fn run_cycle(&self, produced: &mut Vec<PathBuf>) -> Result<GeneratedVideo, PipelineError> {
        let prompt = self.prompts.generate().await;

        let base = self.base_image(&prompt).await?;
        produced.push(base.clone());

        let variations = generate_sequential_variations(&*self.images, &prompt, &base, &self.chain).await;
        produced.extend(variations.iter().cloned());
        log::info!("Generated {} of {} variations", variations.len(), self.chain.iterations);

        let (cover, title) = self.cover.generate(&base, &prompt).await?;
        produced.push(cover.clone());

        let (audio, description) = self.narration.generate_audio(&prompt).await?;
        produced.push(audio.clone());

        let mut frames = Vec::with_capacity(variations.len() + 1);
        frames.push(base.clone());
        frames.extend(variations.iter().cloned());
        let plan = FramePlan::new(cover.clone(), frames.clone());

        let video = self.compositor.compile(&plan, &audio).await?;
        produced.push(video.clone());

        let mut images = Vec::with_capacity(frames.len() + 1);
        images.push(cover);
        images.extend(frames);

        Ok(GeneratedVideo {
            video,
            images,
            audio,
            title,
            description,
        })
    }

    /// One generation cycle; partial files are removed when it fails.
    pub async fn generate_video(&self) -> Result<GeneratedVideo, PipelineError> {
        let mut produced = Vec::new();
        let result = self.run_cycle(&mut produced).await;
        if result.is_err() {
            remove_files(&produced).await;
        }
        result
    }

    /// Generates until the duration is accepted, delivers, then uploads.
    pub async fn run_scheduled_generation(
        &self,
        delivery: &dyn Delivery,
        chat_id: i64,
        uploader: Option<&dyn VideoUploader>,
    ) -> Result<ScheduledRun, PipelineError> {
        log::info!("Starting scheduled video generation for chat {}", chat_id);
        notify(delivery, chat_id, START_MESSAGE).await;

        let video = self.generate_accepted(delivery, chat_id).await?;

        if let Err(e) = delivery.send_video(chat_id, &video.video, VIDEO_CAPTION).await {
            log::error!("Failed to send video: {}", e);
            notify(delivery, chat_id, &format!("❌ Ошибка отправки видео: {}", e)).await;
        }
        if let Err(e) = delivery.send_media_group(chat_id, &video.images).await {
            log::error!("Failed to send media group: {}", e);
        }

        let upload = match uploader {
            Some(uploader) => upload_and_report(delivery, chat_id, uploader, &video.pending_upload()).await,
            None => UploadOutcome::Skipped,
        };

        Ok(ScheduledRun { video, upload })
    }

    async fn generate_accepted(&self, delivery: &dyn Delivery, chat_id: i64) -> Result<GeneratedVideo, PipelineError> {
        for attempt in 1..=self.max_attempts {
            log::info!("🎬 Generation attempt {}/{}", attempt, self.max_attempts);
            let timer = PIPELINE_DURATION_SECONDS.start_timer();
            let result = self.generate_video().await;
            timer.observe_duration();

            let video = match result {
                Ok(video) => video,
                Err(e) => {
                    PIPELINE_ATTEMPTS_TOTAL.with_label_values(&[e.outcome()]).inc();
                    log::error!("Critical generation error (chat_id={}): {:?}", chat_id, e);
                    notify(delivery, chat_id, &e.report()).await;
                    continue;
                }
            };

            if !video.video.exists() {
                let e = PipelineError::MissingArtifact(video.video.clone());
                PIPELINE_ATTEMPTS_TOTAL.with_label_values(&[e.outcome()]).inc();
                log::error!("{}", e);
                notify(delivery, chat_id, &e.report()).await;
                remove_files(&video.working_files()).await;
                continue;
            }

            let seconds = match self.compositor.probe_duration(&video.video).await {
                Ok(seconds) => seconds,
                Err(e) => {
                    let e = PipelineError::from(e);
                    PIPELINE_ATTEMPTS_TOTAL.with_label_values(&[e.outcome()]).inc();
                    log::error!("Failed to probe {}: {}", video.video.display(), e);
                    notify(delivery, chat_id, &e.report()).await;
                    remove_files(&video.working_files()).await;
                    continue;
                }
            };

            if is_accepted_duration(seconds) {
                PIPELINE_ATTEMPTS_TOTAL.with_label_values(&["accepted"]).inc();
                log::info!("✅ Video duration {:.1}s is within the accepted window", seconds);
                return Ok(video);
            }

            PIPELINE_ATTEMPTS_TOTAL.with_label_values(&["wrong_duration"]).inc();
            log::warn!("Video duration {:.1}s is out of bounds, regenerating", seconds);
            notify(delivery, chat_id, WRONG_DURATION_MESSAGE).await;
            remove_files(&video.working_files()).await;
        }

        let e = PipelineError::AttemptsExhausted(self.max_attempts);
        log::error!("{}", e);
        notify(delivery, chat_id, &format!("❌ {}", e)).await;
        Err(e)
    }
}

/// Uploads `pending` and tells the chat how it went.
pub async fn upload_and_report(
    delivery: &dyn Delivery,
    chat_id: i64,
    uploader: &dyn VideoUploader,
    pending: &PendingUpload,
) -> UploadOutcome {
    match uploader.upload(&pending.video, &pending.metadata).await {
        Ok(id) => {
            notify(delivery, chat_id, &format!("🎥 Видео успешно загружено: {}", watch_url(&id))).await;
            UploadOutcome::Uploaded(id)
        }
        Err(UploadError::Unauthorized(reason)) => {
            log::warn!("Upload needs authorization: {}", reason);
            notify(delivery, chat_id, AUTH_REQUIRED_MESSAGE).await;
            UploadOutcome::NeedsAuth(pending.clone())
        }
        Err(e) => {
            log::error!("Video upload error: {}", e);
            notify(delivery, chat_id, &format!("❌ Ошибка при загрузке видео: {}", e)).await;
            UploadOutcome::Failed(e.to_string())
        }
    }
}

/// Status messages are best effort.
async fn notify(delivery: &dyn Delivery, chat_id: i64, text: &str) {
    if let Err(e) = delivery.send_message(chat_id, text).await {
        log::error!("Failed to send message to {}: {}", chat_id, e);
    }
}
