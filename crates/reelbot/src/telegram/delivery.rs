//! Telegram implementation of the pipeline's [`Delivery`] seam

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reelcore::config;
use reelcore::pipeline::{Delivery, DeliveryError};
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto};

fn delivery_error(e: teloxide::RequestError) -> DeliveryError {
    DeliveryError(e.to_string())
}

/// Sends pipeline output through the Bot API.
#[derive(Clone)]
pub struct TelegramDelivery {
    bot: Bot,
    group_size: usize,
    group_delay: Duration,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            group_size: config::telegram::MEDIA_GROUP_SIZE,
            group_delay: config::telegram::media_group_delay(),
        }
    }

    /// Pause between consecutive media groups.
    pub fn group_delay(mut self, delay: Duration) -> Self {
        self.group_delay = delay;
        self
    }

    /// One album, or a plain photo when the chunk has a single image.
    async fn send_chunk(&self, chat_id: i64, chunk: &[&PathBuf], caption: String) -> Result<(), DeliveryError> {
        if let [single] = chunk {
            self.bot
                .send_photo(ChatId(chat_id), InputFile::file(single.as_path()))
                .caption(caption)
                .await
                .map_err(delivery_error)?;
            return Ok(());
        }

        let media: Vec<InputMedia> = chunk
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let photo = InputMediaPhoto::new(InputFile::file(path.as_path()));
                InputMedia::Photo(if i == 0 { photo.caption(caption.clone()) } else { photo })
            })
            .collect();
        self.bot
            .send_media_group(ChatId(chat_id), media)
            .await
            .map_err(delivery_error)?;
        Ok(())
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(delivery_error)?;
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, video: &Path, caption: &str) -> Result<(), DeliveryError> {
        log::info!("Sending video {} to {}", video.display(), chat_id);
        self.bot
            .send_video(ChatId(chat_id), InputFile::file(video))
            .caption(caption)
            .await
            .map_err(delivery_error)?;
        Ok(())
    }

    /// Chunks of `group_size`, the first item of each captioned "Медиагруппа N".
    /// Missing files are skipped. Fails only if no chunk could be sent.
    async fn send_media_group(&self, chat_id: i64, images: &[PathBuf]) -> Result<(), DeliveryError> {
        let existing: Vec<&PathBuf> = images
            .iter()
            .filter(|path| {
                let exists = path.exists();
                if !exists {
                    log::warn!("Skipping missing image {}", path.display());
                }
                exists
            })
            .collect();
        if existing.is_empty() {
            log::warn!("No images to send to {}", chat_id);
            return Ok(());
        }

        let chunks: Vec<&[&PathBuf]> = existing.chunks(self.group_size.max(1)).collect();
        let total = chunks.len();
        let mut last_error = None;
        let mut failed = 0;
        for (index, chunk) in chunks.into_iter().enumerate() {
            let caption = format!("Медиагруппа {}", index + 1);
            log::info!("Sending media group {}/{} ({} images) to {}", index + 1, total, chunk.len(), chat_id);

            // A failed album is logged and the rest still go out
            if let Err(e) = self.send_chunk(chat_id, chunk, caption).await {
                log::error!("Failed to send media group {}/{} to {}: {}", index + 1, total, chat_id, e);
                failed += 1;
                last_error = Some(e);
            }

            if index + 1 < total && !self.group_delay.is_zero() {
                tokio::time::sleep(self.group_delay).await;
            }
        }

        match last_error {
            Some(e) if failed == total => Err(e),
            _ => Ok(()),
        }
    }

    async fn send_audio(&self, chat_id: i64, audio: &Path) -> Result<(), DeliveryError> {
        self.bot
            .send_audio(ChatId(chat_id), InputFile::file(audio))
            .await
            .map_err(delivery_error)?;
        Ok(())
    }
}
