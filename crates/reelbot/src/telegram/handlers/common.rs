//! /start, /cancel and the way back to the main menu

use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{sender_id, HandlerDeps, HandlerResult};
use crate::telegram::dialogue::TXT_CANCELLED;
use crate::telegram::keyboards::main_keyboard;

pub const ERROR_MESSAGE: &str = "⚠️ Произошла ошибка при обработке запроса. Попробуйте позже.";
pub const ANONYMOUS: &str = "Анонимный пользователь";
pub const ACCESS_DENIED: &str = "⛔ Команда доступна только администраторам";

pub fn welcome_text(name: &str) -> String {
    format!("🎉 Добро пожаловать, {}!\n\n🛠 Выберите нужное действие в меню ниже:", name)
}

pub async fn handle_start(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    deps.dialogs.clear(msg.chat.id.0);

    let user = match deps.ensure_user(msg) {
        Ok(user) => user,
        Err(e) => {
            log::error!("Failed to register user {}: {}", sender_id(msg), e);
            bot.send_message(msg.chat.id, ERROR_MESSAGE).await?;
            return Ok(());
        }
    };

    let name = msg
        .from
        .as_ref()
        .map(|u| u.full_name())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());
    log::info!("👋 /start from {} ({})", user.display_name(), user.telegram_id);

    bot.send_message(msg.chat.id, welcome_text(&name))
        .reply_markup(main_keyboard(user.is_admin))
        .await?;
    Ok(())
}

/// Main menu with `text`, keyboard chosen by the sender's admin flag.
pub async fn show_main_menu(bot: &Bot, msg: &Message, deps: &HandlerDeps, text: &str) -> HandlerResult {
    let is_admin = deps.is_admin(sender_id(msg));
    bot.send_message(msg.chat.id, text)
        .reply_markup(main_keyboard(is_admin))
        .await?;
    Ok(())
}

pub async fn handle_cancel(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if let Some(state) = deps.dialogs.clear(msg.chat.id.0) {
        log::info!("Dialog cancelled in chat {}: {:?}", msg.chat.id, state);
    }
    show_main_menu(bot, msg, deps, TXT_CANCELLED).await
}

pub async fn back_to_main(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    show_main_menu(bot, msg, deps, "Главное меню:").await
}

/// Replies with [`ACCESS_DENIED`] and returns false for non-admins.
pub async fn require_admin(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<bool, teloxide::RequestError> {
    let user_id = sender_id(msg);
    if deps.is_admin(user_id) {
        return Ok(true);
    }
    log::warn!("Admin action denied for {}", user_id);
    bot.send_message(msg.chat.id, ACCESS_DENIED).await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_text() {
        assert_eq!(
            welcome_text("Анна"),
            "🎉 Добро пожаловать, Анна!\n\n🛠 Выберите нужное действие в меню ниже:"
        );
    }
}
