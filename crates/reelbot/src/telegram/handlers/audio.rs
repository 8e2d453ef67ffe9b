//! Text to speech for any user

use teloxide::prelude::*;
use teloxide::types::{InputFile, Message};

use super::common::show_main_menu;
use super::types::{sender_id, HandlerDeps, HandlerResult};
use crate::telegram::dialogue::DialogState;
use crate::telegram::keyboards::{main_keyboard, remove_keyboard};

pub const TXT_ASK_TEXT: &str = "Отправь мне текст для преобразования в аудио";
pub const TXT_AUDIO_READY: &str = "Ваше аудио готово!";
pub const TXT_UNAVAILABLE: &str = "⚠️ Генерация аудио недоступна: не настроены учетные данные SaluteSpeech";

pub async fn start_audio_dialog(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if deps.services.narration.is_none() {
        return show_main_menu(bot, msg, deps, TXT_UNAVAILABLE).await;
    }
    deps.dialogs.set(msg.chat.id.0, DialogState::WaitingAudioText);
    bot.send_message(msg.chat.id, TXT_ASK_TEXT)
        .reply_markup(remove_keyboard())
        .await?;
    Ok(())
}

pub async fn handle_synthesize(bot: &Bot, msg: &Message, deps: &HandlerDeps, text: &str) -> HandlerResult {
    let Some(narration) = deps.services.narration.as_ref() else {
        return show_main_menu(bot, msg, deps, TXT_UNAVAILABLE).await;
    };
    log::info!("🔊 Audio requested by {} ({} chars)", sender_id(msg), text.chars().count());

    match narration.generate_audio_file(text, None).await {
        Ok(path) => {
            let is_admin = deps.is_admin(sender_id(msg));
            bot.send_audio(msg.chat.id, InputFile::file(&path))
                .caption(TXT_AUDIO_READY)
                .reply_markup(main_keyboard(is_admin))
                .await?;
            if let Err(e) = fs_err::tokio::remove_file(&path).await {
                log::warn!("Failed to remove {}: {}", path.display(), e);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Audio generation failed: {}", e);
            show_main_menu(bot, msg, deps, &format!("Ошибка: {}", e)).await
        }
    }
}
