//! Stills plus narration into an mp4, rendered by ffmpeg.
//!
//! Frames are fed through the concat demuxer with a per-file duration, so
//! the first frame (the cover) can be held longer than the rest.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config;
use crate::core::error::AppError;
use crate::core::process::{run_with_timeout, FFMPEG_TIMEOUT, FFPROBE_TIMEOUT};
use crate::core::utils::{remove_files, reserve_next};

/// Errors that can occur while rendering or probing a video
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Nothing to render: the frame plan is empty")]
    EmptyPlan,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Process timed out: {0}")]
    Timeout(String),
}

impl From<AppError> for ConversionError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Io(e) => Self::IoError(e),
            AppError::Process(msg) => Self::Timeout(msg),
            other => Self::FfmpegError(other.to_string()),
        }
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Ordered frames with their on-screen durations
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    frames: Vec<(PathBuf, f64)>,
    fps: u32,
}

impl FramePlan {
    /// `first` is held 1.0 s, every other frame 0.5 s, at 24 fps.
    pub fn new(first: impl Into<PathBuf>, rest: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut frames = vec![(first.into(), config::video::FIRST_FRAME_SECS)];
        frames.extend(rest.into_iter().map(|p| (p, config::video::FRAME_SECS)));
        Self {
            frames,
            fps: config::video::FPS,
        }
    }

    pub fn frames(&self) -> &[(PathBuf, f64)] {
        &self.frames
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Length of the picture track in seconds
    pub fn total_duration(&self) -> f64 {
        self.frames.iter().map(|(_, d)| d).sum()
    }

    /// ffconcat script; the last file is repeated because the demuxer
    /// ignores the duration of the final entry.
    pub fn concat_list(&self) -> String {
        let mut list = String::from("ffconcat version 1.0\n");
        for (path, duration) in &self.frames {
            list.push_str(&format!("file '{}'\nduration {}\n", escape_concat_path(path), duration));
        }
        if let Some((last, _)) = self.frames.last() {
            list.push_str(&format!("file '{}'\n", escape_concat_path(last)));
        }
        list
    }
}

fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

/// ffmpeg arguments for one render.
///
/// The picture track sets the length: the narration is padded with silence
/// and the output is cut at the plan's total duration, so every frame is shown.
fn compile_args(plan: &FramePlan, list: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
        .into_iter()
        .chain(["-f", "concat", "-safe", "0", "-i"])
        .map(OsString::from)
        .collect();
    args.push(list.into());
    args.push("-i".into());
    args.push(audio.into());
    for arg in [
        "-r".to_string(),
        plan.fps().to_string(),
        "-vf".to_string(),
        "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
        "-af".to_string(),
        "apad".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-t".to_string(),
        format!("{:.3}", plan.total_duration()),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ] {
        args.push(arg.into());
    }
    args.push(output.into());
    args
}

/// Renders a frame plan with an audio track and measures results.
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Returns the path of the rendered video.
    async fn compile(&self, plan: &FramePlan, audio: &Path) -> ConversionResult<PathBuf>;

    /// Duration in seconds
    async fn probe_duration(&self, video: &Path) -> ConversionResult<f64>;
}

/// [`Compositor`] backed by the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    output_dir: PathBuf,
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl FfmpegCompositor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout: FFMPEG_TIMEOUT,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn binaries(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn compile(&self, plan: &FramePlan, audio: &Path) -> ConversionResult<PathBuf> {
        if plan.frames().is_empty() {
            return Err(ConversionError::EmptyPlan);
        }
        if !audio.exists() {
            return Err(ConversionError::InputNotFound(audio.display().to_string()));
        }

        // The concat demuxer resolves relative paths against the list file
        let mut absolute = Vec::with_capacity(plan.frames().len());
        for (path, duration) in plan.frames() {
            if !path.exists() {
                return Err(ConversionError::InputNotFound(path.display().to_string()));
            }
            absolute.push((std::path::absolute(path)?, *duration));
        }
        let plan = FramePlan {
            frames: absolute,
            fps: plan.fps(),
        };

        let output_path = reserve_next(&self.output_dir, "video_", ".mp4").await?;
        let list_path = output_path.with_extension("txt");
        fs_err::tokio::write(&list_path, plan.concat_list()).await?;

        log::info!(
            "🎬 Compiling {} frames ({:.1}s) into {}",
            plan.frames().len(),
            plan.total_duration(),
            output_path.display()
        );

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(compile_args(&plan, &list_path, audio, &output_path));

        let result = run_with_timeout(&mut cmd, self.timeout).await;
        if let Err(e) = fs_err::tokio::remove_file(&list_path).await {
            log::debug!("Failed to remove concat list: {}", e);
        }
        let failure = match result {
            Ok(output) if output.status.success() => None,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                log::error!("FFmpeg compile error: {}", stderr);
                Some(ConversionError::FfmpegError(stderr))
            }
            Err(e) => Some(e.into()),
        };
        if let Some(err) = failure {
            // Drop the reserved placeholder
            remove_files(&[&output_path]).await;
            return Err(err);
        }

        log::info!("✅ Compiled video {}", output_path.display());
        Ok(output_path)
    }

    async fn probe_duration(&self, video: &Path) -> ConversionResult<f64> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(video);

        let output = run_with_timeout(&mut cmd, FFPROBE_TIMEOUT).await?;
        if !output.status.success() {
            return Err(ConversionError::FfmpegError(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_duration(raw: &str) -> ConversionResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ConversionError::FfmpegError(format!("Failed to parse duration '{}'", raw.trim())))
}
