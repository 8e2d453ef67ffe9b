//! Stable Diffusion WebUI backend.
//!
//! [`SdApiClient`] talks to the WebUI JSON API; [`ImageBackend`] is the narrow
//! seam the variation chain, the video pipeline and the bot dialogs use.

pub mod chain;
pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chain::{generate_sequential_variations, ChainConfig};
pub use client::{RefreshTarget, SdApiClient};

/// Errors returned by the diffusion client
#[derive(Error, Debug)]
pub enum SdApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SD API returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Text-to-image request parameters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Txt2ImgParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    /// -1 lets the backend pick a random seed
    pub seed: i64,
    pub n_iter: u32,
    pub batch_size: u32,
    pub restore_faces: bool,
}

impl Default for Txt2ImgParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: "low quality, deformed, blurry".to_string(),
            steps: 25,
            width: 512,
            height: 768,
            cfg_scale: 7.5,
            sampler_name: "DPM++ 2M Karras".to_string(),
            seed: -1,
            n_iter: 1,
            batch_size: 1,
            restore_faces: false,
        }
    }
}

impl Txt2ImgParams {
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Replaces the sampler with the first available one if the backend doesn't know it.
    pub fn apply_sampler_fallback(&mut self, available: &[Sampler]) {
        if available.is_empty() || available.iter().any(|s| s.name == self.sampler_name) {
            return;
        }
        self.sampler_name = available[0].name.clone();
        log::warn!("Using fallback sampler: {}", self.sampler_name);
    }

    pub(crate) fn validate(&self) -> Result<(), SdApiError> {
        validate_common(&self.prompt, self.steps, self.width, self.height)
    }
}

/// Lowest denoising strength used by the variation chain
pub const MIN_DENOISING: f32 = 0.3;
/// Highest denoising strength used by the variation chain
pub const MAX_DENOISING: f32 = 0.6;
pub const DEFAULT_DENOISING: f32 = 0.4;

/// Image-to-image request parameters (the init images travel separately).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Img2ImgParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub seed: i64,
    pub resize_mode: u8,
    pub denoising_strength: f32,
    pub restore_faces: bool,
}

impl Default for Img2ImgParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: "deformed, blurry, low quality, artifacts".to_string(),
            steps: 20,
            width: 512,
            height: 768,
            cfg_scale: 7.0,
            sampler_name: "Euler a".to_string(),
            seed: -1,
            resize_mode: 1,
            denoising_strength: DEFAULT_DENOISING,
            restore_faces: true,
        }
    }
}

impl Img2ImgParams {
    /// Chain parameters for `prompt`, with denoising clamped to [0.3, 0.6].
    pub fn for_chain(prompt: impl Into<String>, denoising_strength: f32) -> Self {
        Self {
            prompt: prompt.into(),
            denoising_strength: clamp_denoising(denoising_strength),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SdApiError> {
        validate_common(&self.prompt, self.steps, self.width, self.height)
    }
}

pub fn clamp_denoising(value: f32) -> f32 {
    if value.is_nan() {
        return DEFAULT_DENOISING;
    }
    value.clamp(MIN_DENOISING, MAX_DENOISING)
}

fn validate_common(prompt: &str, steps: u32, width: u32, height: u32) -> Result<(), SdApiError> {
    if prompt.trim().is_empty() {
        return Err(SdApiError::Validation("prompt is required".to_string()));
    }
    if steps == 0 {
        return Err(SdApiError::Validation("steps must be positive".to_string()));
    }
    if width == 0 || height == 0 {
        return Err(SdApiError::Validation(format!("invalid size {}x{}", width, height)));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Sampler {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdModel {
    pub title: String,
    pub model_name: String,
    #[serde(default)]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Upscaler {
    pub name: String,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Generation progress reported by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub eta_relative: f64,
    /// Base64 preview of the image being generated
    #[serde(default)]
    pub current_image: Option<String>,
    #[serde(default)]
    pub textinfo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RamStats {
    #[serde(default)]
    pub free: f64,
    #[serde(default)]
    pub used: f64,
    #[serde(default)]
    pub total: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryCounter {
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub peak: f64,
}

/// CUDA section; all zeros when the backend runs without a GPU.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CudaStats {
    #[serde(default)]
    pub allocated: MemoryCounter,
    #[serde(default)]
    pub reserved: MemoryCounter,
}

/// Response of `/sdapi/v1/memory`, values in bytes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub ram: RamStats,
    #[serde(default)]
    pub cuda: CudaStats,
}

/// What the pipeline and the bot need from an image generator.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Samplers known to the backend
    async fn samplers(&self) -> Result<Vec<Sampler>, SdApiError>;

    /// Returns decoded image bytes, one entry per generated image.
    async fn txt2img(&self, params: &Txt2ImgParams) -> Result<Vec<Vec<u8>>, SdApiError>;

    /// Requires at least one init image.
    async fn img2img(&self, params: &Img2ImgParams, init_images: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, SdApiError>;
}
