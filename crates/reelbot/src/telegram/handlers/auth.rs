//! YouTube OAuth code flow and the upload that was waiting for it

use reelcore::pipeline::{upload_and_report, UploadOutcome};
use reelcore::upload::PendingUpload;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message};

use super::common::{require_admin, show_main_menu};
use super::types::{HandlerDeps, HandlerResult};
use crate::telegram::delivery::TelegramDelivery;
use crate::telegram::dialogue::DialogState;

pub const TXT_ALREADY_AUTHORIZED: &str = "✅ Вы уже авторизованы!";
pub const TXT_AUTH_DONE: &str = "✅ Авторизация успешно завершена!";
pub const TXT_AUTH_FAILED: &str =
    "❌ Ошибка: Неверный код или проблема с подключением. Попробуйте снова командой /auth";
pub const TXT_AUTH_UNAVAILABLE: &str = "❌ Не удалось сформировать ссылку авторизации: нет client_secrets.json";

pub fn auth_link_text(url: &str) -> String {
    format!(
        "🔑 [Авторизация] Пожалуйста, перейдите по ссылке:\n{}\n\nПосле разрешения доступа введите полученный код:",
        url
    )
}

/// Sends the consent link and waits for the code; uploads right away when
/// the token is already valid.
pub async fn start_auth(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let chat_id = msg.chat.id.0;
    let youtube = &deps.services.youtube;

    if youtube.auth().is_authorized().await {
        bot.send_message(msg.chat.id, TXT_ALREADY_AUTHORIZED).await?;
        if let Some(pending) = deps.dialogs.take_upload(chat_id) {
            upload_pending(bot, deps, chat_id, pending).await;
        }
        return Ok(());
    }

    let url = match youtube.auth().authorization_url().await {
        Ok(url) => url,
        Err(e) => {
            log::error!("Failed to build YouTube authorization URL: {}", e);
            bot.send_message(msg.chat.id, TXT_AUTH_UNAVAILABLE).await?;
            return Ok(());
        }
    };

    let request = bot.send_message(msg.chat.id, auth_link_text(&url));
    match url::Url::parse(&url) {
        Ok(parsed) => {
            let markup = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url("Открыть ссылку", parsed)]]);
            request.reply_markup(markup).await?;
        }
        Err(e) => {
            log::warn!("Authorization URL is not a valid URL ({}), sending text only", e);
            request.await?;
        }
    }

    let pending = deps.dialogs.take_upload(chat_id);
    deps.dialogs.set(chat_id, DialogState::WaitingAuthCode { pending });
    Ok(())
}

/// Exchanges the code typed by the admin for a token.
pub async fn handle_auth_code(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    code: &str,
    pending: Option<PendingUpload>,
) -> HandlerResult {
    let chat_id = msg.chat.id.0;

    if let Err(e) = deps.services.youtube.auth().complete_authorization(code).await {
        log::error!("YouTube authorization failed: {}", e);
        // Keep the video for the next attempt
        if let Some(pending) = pending {
            deps.dialogs.remember_upload(chat_id, pending);
        }
        return show_main_menu(bot, msg, deps, TXT_AUTH_FAILED).await;
    }

    log::info!("🔑 YouTube authorization completed in chat {}", chat_id);
    show_main_menu(bot, msg, deps, TXT_AUTH_DONE).await?;

    if let Some(pending) = pending {
        upload_pending(bot, deps, chat_id, pending).await;
    }
    Ok(())
}

async fn upload_pending(bot: &Bot, deps: &HandlerDeps, chat_id: i64, pending: PendingUpload) {
    log::info!("Uploading pending video {}", pending.video.display());
    let delivery = TelegramDelivery::new(bot.clone());
    let outcome = upload_and_report(&delivery, chat_id, deps.services.youtube.as_ref(), &pending).await;
    if let UploadOutcome::NeedsAuth(pending) = outcome {
        deps.dialogs.remember_upload(chat_id, pending);
    }
}
