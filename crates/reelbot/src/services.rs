//! Wiring of the external backends the bot talks to
//!
//! Missing Sber credentials are not fatal: the bot still serves images,
//! memory stats and the admin panel, and reports video/audio as unavailable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reelcore::compose::FfmpegCompositor;
use reelcore::config;
use reelcore::cover::{load_font, CoverGenerator};
use reelcore::diffusion::{ChainConfig, SdApiClient};
use reelcore::llm::{ChatModel, GigaChatClient};
use reelcore::oauth::{sber_http_client, SberOAuthFetcher, TokenProvider};
use reelcore::pipeline::VideoPipeline;
use reelcore::prompt::{PromptGenerator, PromptKind};
use reelcore::speech::{NarrationGenerator, SaluteSpeechClient, SpeechSynth};
use reelcore::upload::{YouTubeAuth, YouTubeUploader};

use crate::scheduler::VideoJob;

/// Output subdirectories under `OUTPUT_DIR`.
pub struct OutputDirs {
    pub generated: PathBuf,
    pub sequential: PathBuf,
    pub covers: PathBuf,
    pub sound: PathBuf,
    pub video: PathBuf,
}

impl OutputDirs {
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            generated: root.join("generated"),
            sequential: root.join("sequential"),
            covers: root.join("covers"),
            sound: root.join("sound"),
            video: root.join("video"),
        }
    }

    pub async fn create_all(&self) -> std::io::Result<()> {
        for dir in [&self.generated, &self.sequential, &self.covers, &self.sound, &self.video] {
            fs_err::tokio::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

pub struct Services {
    pub sd: Arc<SdApiClient>,
    pub chat: Option<Arc<dyn ChatModel>>,
    /// Voicing arbitrary text for the audio dialog
    pub narration: Option<Arc<NarrationGenerator>>,
    pub youtube: Arc<YouTubeUploader>,
    pub video_job: Arc<VideoJob>,
    pub dirs: OutputDirs,
    token_providers: Vec<Arc<TokenProvider>>,
}

async fn start_provider(name: &str, fetcher: Option<SberOAuthFetcher>) -> Option<Arc<TokenProvider>> {
    let Some(fetcher) = fetcher else {
        log::warn!("{} credentials are not configured", name);
        return None;
    };
    let provider = Arc::new(TokenProvider::spawn(name, Arc::new(fetcher)));
    if let Err(e) = provider.wait_ready(config::sber::token_ready_timeout()).await {
        // Keeps refreshing in the background; requests fail fast until then
        log::error!("{} token is not ready yet: {}", name, e);
    }
    Some(provider)
}

impl Services {
    pub async fn from_env() -> anyhow::Result<Self> {
        let dirs = OutputDirs::under(config::OUTPUT_DIR.as_str());
        dirs.create_all().await.context("failed to create output directories")?;

        let sd = Arc::new(SdApiClient::from_env().context("invalid SD_API_URL")?);
        log::info!("SD WebUI backend: {}", sd.base_url());

        let sber_http = sber_http_client().context("failed to build Sber HTTP client")?;
        let gigachat_tokens = start_provider(
            "GigaChat",
            SberOAuthFetcher::gigachat_from_env(sber_http.clone()).ok(),
        )
        .await;
        let salute_tokens = start_provider(
            "SaluteSpeech",
            SberOAuthFetcher::salute_from_env(sber_http.clone()).ok(),
        )
        .await;

        let chat: Option<Arc<dyn ChatModel>> = gigachat_tokens
            .clone()
            .map(|tokens| Arc::new(GigaChatClient::from_env(sber_http.clone(), tokens)) as Arc<dyn ChatModel>);
        let speech: Option<Arc<dyn SpeechSynth>> = salute_tokens
            .clone()
            .map(|tokens| Arc::new(SaluteSpeechClient::from_env(sber_http.clone(), tokens)) as Arc<dyn SpeechSynth>);

        let narration_for = |chat: &Arc<dyn ChatModel>, speech: &Arc<dyn SpeechSynth>| {
            NarrationGenerator::new(chat.clone(), speech.clone(), config::sber::VOICES.clone(), &dirs.sound)
        };
        let narration = match (&chat, &speech) {
            (Some(chat), Some(speech)) => Some(Arc::new(narration_for(chat, speech))),
            _ => None,
        };

        let youtube = Arc::new(YouTubeUploader::from_env(YouTubeAuth::from_env(reqwest::Client::new()))?);

        let pipeline = match (&chat, &speech) {
            (Some(chat), Some(speech)) => {
                let kind = config::PROMPT_TYPE.parse::<PromptKind>().unwrap_or_else(|_| {
                    log::warn!("Unknown PROMPT_TYPE {}, using SIMPLE", config::PROMPT_TYPE.as_str());
                    PromptKind::Simple
                });
                let font = config::FONT_PATH.as_deref().and_then(load_font);
                let pipeline = VideoPipeline::builder()
                    .prompts(PromptGenerator::new(kind, Some(chat.clone())))
                    .images(sd.clone())
                    .chain(
                        ChainConfig::new(*config::video::ITERATIONS, &dirs.sequential)
                            .step_delay(Duration::from_millis(config::video::STEP_DELAY_MS)),
                    )
                    .cover(CoverGenerator::new(Some(chat.clone()), font, &dirs.covers))
                    .narration(narration_for(chat, speech))
                    .compositor(Arc::new(FfmpegCompositor::new(&dirs.video)))
                    .generated_dir(&dirs.generated)
                    .max_attempts(*config::video::MAX_ATTEMPTS)
                    .build();
                Some(Arc::new(pipeline))
            }
            _ => {
                log::warn!("Video pipeline disabled: GigaChat and SaluteSpeech credentials are both required");
                None
            }
        };

        let video_job = Arc::new(VideoJob::new(pipeline, youtube.clone()));
        let token_providers = gigachat_tokens.into_iter().chain(salute_tokens).collect();

        Ok(Self {
            sd,
            chat,
            narration,
            youtube,
            video_job,
            dirs,
            token_providers,
        })
    }

    /// Stops the token refresh tasks.
    pub fn shutdown(&self) {
        for provider in &self.token_providers {
            provider.shutdown();
        }
    }
}
