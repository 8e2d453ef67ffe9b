//! Video generation jobs: the weekly schedule and on-demand admin runs
//!
//! Only one generation may run at a time. A run that finds another one in
//! progress is skipped rather than queued.

use std::sync::Arc;

use chrono::Utc;
use reelcore::pipeline::{Delivery, PipelineError, ScheduledRun, UploadOutcome, VideoPipeline};
use reelcore::schedule::WeeklySchedule;
use reelcore::upload::VideoUploader;
use teloxide::prelude::*;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::telegram::delivery::TelegramDelivery;
use crate::telegram::dialogue::DialogStore;
use crate::telegram::notifications::notify_text;

pub const BUSY_MESSAGE: &str = "⏳ Генерация видео уже выполняется";
pub const UNAVAILABLE_MESSAGE: &str =
    "⚠️ Генерация видео недоступна: не настроены учетные данные GigaChat и SaluteSpeech";

#[derive(Error, Debug)]
pub enum JobError {
    #[error("another video generation is already running")]
    Busy,

    #[error("video pipeline is not configured")]
    Unavailable,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// The pipeline behind a single-flight lock.
pub struct VideoJob {
    pipeline: Option<Arc<VideoPipeline>>,
    uploader: Arc<dyn VideoUploader>,
    lock: Mutex<()>,
}

impl VideoJob {
    pub fn new(pipeline: Option<Arc<VideoPipeline>>, uploader: Arc<dyn VideoUploader>) -> Self {
        Self {
            pipeline,
            uploader,
            lock: Mutex::new(()),
        }
    }

    pub fn pipeline(&self) -> Option<&Arc<VideoPipeline>> {
        self.pipeline.as_ref()
    }

    pub fn uploader(&self) -> &dyn VideoUploader {
        self.uploader.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Runs one scheduled generation unless one is already in progress.
    pub async fn run(&self, delivery: &dyn Delivery, chat_id: i64, upload: bool) -> Result<ScheduledRun, JobError> {
        let _guard = self.lock.try_lock().map_err(|_| JobError::Busy)?;
        let pipeline = self.pipeline.as_ref().ok_or(JobError::Unavailable)?;
        let uploader = if upload { Some(self.uploader.as_ref()) } else { None };
        Ok(pipeline.run_scheduled_generation(delivery, chat_id, uploader).await?)
    }
}

/// Runs `job` for `chat_id` and keeps a video that still needs authorization.
///
/// Returns the run, or `None` when it was skipped or failed; the pipeline has
/// already reported failures to the chat.
pub async fn run_video_job(
    job: &VideoJob,
    delivery: &dyn Delivery,
    dialogs: &DialogStore,
    chat_id: i64,
    upload: bool,
) -> Option<ScheduledRun> {
    match job.run(delivery, chat_id, upload).await {
        Ok(run) => {
            if let UploadOutcome::NeedsAuth(pending) = &run.upload {
                dialogs.remember_upload(chat_id, pending.clone());
            }
            log::info!("Video generation finished: {}", run.video.video.display());
            Some(run)
        }
        Err(JobError::Busy) => {
            log::warn!("Skipping video generation for {}: {}", chat_id, JobError::Busy);
            None
        }
        Err(JobError::Unavailable) => {
            log::error!("Video generation requested but the pipeline is not configured");
            if let Err(e) = delivery.send_message(chat_id, UNAVAILABLE_MESSAGE).await {
                log::error!("Failed to report unavailable pipeline: {}", e);
            }
            None
        }
        Err(JobError::Pipeline(e)) => {
            log::error!("Video generation failed: {}", e);
            None
        }
    }
}

/// Fires the video job at every scheduled time, forever.
pub fn spawn_scheduler(
    schedule: WeeklySchedule,
    bot: Bot,
    job: Arc<VideoJob>,
    dialogs: Arc<DialogStore>,
    chat_id: i64,
    upload: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let delivery = TelegramDelivery::new(bot.clone());
        let mut after = Utc::now();
        loop {
            let next = schedule.next_after(after);
            log::info!("⏰ Next scheduled video generation at {} (upload: {})", next, upload);
            tokio::time::sleep((next - Utc::now()).to_std().unwrap_or_default()).await;
            // Never fire the same slot twice, even if the sleep woke early
            after = next.max(Utc::now());

            if job.is_running() {
                log::warn!("Scheduled generation skipped: previous run is still in progress");
                notify_text(&bot, chat_id, BUSY_MESSAGE).await;
                continue;
            }
            run_video_job(&job, &delivery, &dialogs, chat_id, upload).await;
        }
    })
}
