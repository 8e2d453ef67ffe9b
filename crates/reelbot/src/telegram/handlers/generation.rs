//! Image generation dialog: prompt, parameters, txt2img, media group

use std::path::PathBuf;

use reelcore::core::utils::save_next;
use reelcore::diffusion::ImageBackend;
use reelcore::get_connection;
use reelcore::pipeline::Delivery;
use reelcore::storage::requests::{create_request, update_request_status, GenerationStatus, NewImageRequest};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::common::{require_admin, show_main_menu};
use super::types::{sender_id, HandlerDeps, HandlerError, HandlerResult};
use crate::telegram::delivery::TelegramDelivery;
use crate::telegram::dialogue::{DialogState, ImageDraft, Reply, ReplyKeyboard, TXT_START_GENERATION};
use crate::telegram::keyboards::{
    back_keyboard, faces_keyboard, parameters_keyboard, remove_keyboard, samplers_keyboard, size_keyboard,
};

pub const TXT_DONE: &str = "Получай сгенерированные изображения. Что ты хочешь сделать дальше?";

/// Opens the dialog by asking for the prompt.
pub async fn start_image_dialog(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    deps.dialogs.set(msg.chat.id.0, DialogState::WaitingPrompt);
    bot.send_message(msg.chat.id, TXT_START_GENERATION)
        .reply_markup(back_keyboard())
        .await?;
    Ok(())
}

/// Sends a dialog reply with the keyboard it asks for.
pub async fn send_reply(bot: &Bot, msg: &Message, deps: &HandlerDeps, reply: Reply) -> HandlerResult {
    let request = bot.send_message(msg.chat.id, reply.text);
    match reply.keyboard {
        ReplyKeyboard::Parameters => request.reply_markup(parameters_keyboard()).await?,
        ReplyKeyboard::Size => request.reply_markup(size_keyboard()).await?,
        ReplyKeyboard::Faces => request.reply_markup(faces_keyboard()).await?,
        ReplyKeyboard::Back => request.reply_markup(back_keyboard()).await?,
        ReplyKeyboard::Samplers => {
            let names: Vec<String> = match deps.services.sd.samplers().await {
                Ok(samplers) => samplers.into_iter().map(|s| s.name).collect(),
                Err(e) => {
                    log::warn!("Failed to fetch samplers, offering free input: {}", e);
                    Vec::new()
                }
            };
            request.reply_markup(samplers_keyboard(&names)).await?
        }
    };
    Ok(())
}

fn set_status(deps: &HandlerDeps, request_id: Option<i64>, status: GenerationStatus) {
    let Some(id) = request_id else { return };
    let result = get_connection(&deps.db_pool)
        .map_err(|e| e.to_string())
        .and_then(|conn| update_request_status(&conn, id, status).map_err(|e| e.to_string()));
    if let Err(e) = result {
        log::error!("Failed to mark request {} as {}: {}", id, status, e);
    }
}

fn record_request(deps: &HandlerDeps, user_id: i64, draft: &ImageDraft) -> Option<i64> {
    let p = &draft.params;
    let request = NewImageRequest {
        user_id,
        prompt: &p.prompt,
        negative_prompt: Some(p.negative_prompt.as_str()).filter(|n| !n.is_empty()),
        width: p.width,
        height: p.height,
        n_iter: p.n_iter,
    };
    let result = get_connection(&deps.db_pool)
        .map_err(|e| e.to_string())
        .and_then(|conn| create_request(&conn, &request).map_err(|e| e.to_string()));
    match result {
        Ok(id) => Some(id),
        Err(e) => {
            log::error!("Failed to record image request for {}: {}", user_id, e);
            None
        }
    }
}

/// Runs txt2img for the draft and saves the images as image_N.png.
pub async fn generate_images(
    backend: &dyn ImageBackend,
    draft: &ImageDraft,
    output_dir: &std::path::Path,
) -> Result<Vec<PathBuf>, HandlerError> {
    let mut params = draft.params.clone();
    match backend.samplers().await {
        Ok(samplers) => params.apply_sampler_fallback(&samplers),
        Err(e) => log::warn!("Could not verify sampler {}: {}", params.sampler_name, e),
    }

    let images = backend.txt2img(&params).await?;

    let mut paths = Vec::with_capacity(images.len());
    for image in images {
        paths.push(save_next(output_dir, "image_", ".png", &image).await?);
    }
    Ok(paths)
}

pub async fn handle_generate(bot: &Bot, msg: &Message, deps: &HandlerDeps, draft: ImageDraft) -> HandlerResult {
    let user_id = sender_id(msg);
    log::info!("🎨 Image generation for {}: {:?}", user_id, draft.params.prompt);

    let request_id = record_request(deps, user_id, &draft);
    bot.send_message(msg.chat.id, format!("🚀 Начинаю генерацию с параметрами:\n{}", draft.summary()))
        .reply_markup(remove_keyboard())
        .await?;
    set_status(deps, request_id, GenerationStatus::Processing);

    let result = generate_images(deps.services.sd.as_ref(), &draft, &deps.services.dirs.generated).await;
    let paths = match result {
        Ok(paths) if !paths.is_empty() => paths,
        Ok(_) => {
            set_status(deps, request_id, GenerationStatus::Failed);
            return show_main_menu(bot, msg, deps, "❌ Сервер не вернул изображений").await;
        }
        Err(e) => {
            log::error!("Image generation failed for {}: {}", user_id, e);
            set_status(deps, request_id, GenerationStatus::Failed);
            return show_main_menu(bot, msg, deps, &format!("❌ Ошибка генерации: {}", e)).await;
        }
    };

    let delivery = TelegramDelivery::new(bot.clone());
    if let Err(e) = delivery.send_media_group(msg.chat.id.0, &paths).await {
        log::error!("Failed to send generated images: {}", e);
        set_status(deps, request_id, GenerationStatus::Failed);
        return show_main_menu(bot, msg, deps, &format!("❌ Ошибка отправки изображений: {}", e)).await;
    }

    set_status(deps, request_id, GenerationStatus::Completed);
    show_main_menu(bot, msg, deps, TXT_DONE).await
}
