//! Chained img2img variations: every step starts from the previous output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{clamp_denoising, ImageBackend, Img2ImgParams, DEFAULT_DENOISING};
use crate::config;
use crate::core::utils::save_next;

/// How a variation chain runs
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Number of img2img steps (upper bound on produced images)
    pub iterations: usize,
    /// Clamped to [0.3, 0.6]
    pub denoising_strength: f32,
    /// Pause after each successful step
    pub step_delay: Duration,
    /// Where variations are saved as image_N.png
    pub output_dir: PathBuf,
}

impl ChainConfig {
    pub fn new(iterations: usize, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            iterations,
            denoising_strength: DEFAULT_DENOISING,
            step_delay: Duration::from_millis(config::video::STEP_DELAY_MS),
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn denoising_strength(mut self, value: f32) -> Self {
        self.denoising_strength = clamp_denoising(value);
        self
    }

    #[must_use]
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

/// Generates up to `iterations` variations of `initial_image`.
///
/// An empty backend response skips the step and keeps the current input.
/// The first error stops the chain; whatever was produced so far is returned.
pub async fn generate_sequential_variations(
    backend: &dyn ImageBackend,
    prompt: &str,
    initial_image: &Path,
    config: &ChainConfig,
) -> Vec<PathBuf> {
    let mut current = match fs_err::tokio::read(initial_image).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Image loading failed: {}", e);
            return Vec::new();
        }
    };

    let params = Img2ImgParams::for_chain(prompt, config.denoising_strength);
    let mut generated = Vec::with_capacity(config.iterations);

    for step in 1..=config.iterations {
        let images = match backend.img2img(&params, std::slice::from_ref(&current)).await {
            Ok(images) => images,
            Err(e) => {
                log::error!("Step {} failed: {}", step, e);
                break;
            }
        };

        let Some(next) = images.into_iter().next() else {
            log::warn!("Empty response at step {}", step);
            continue;
        };

        match save_next(&config.output_dir, "image_", ".png", &next).await {
            Ok(path) => {
                log::info!("Generated step {}/{}", step, config.iterations);
                generated.push(path);
                current = next;
            }
            Err(e) => {
                log::error!("Failed to save step {}: {}", step, e);
                break;
            }
        }

        if !config.step_delay.is_zero() {
            tokio::time::sleep(config.step_delay).await;
        }
    }

    generated
}
