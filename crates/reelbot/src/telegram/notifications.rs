use teloxide::prelude::*;

use super::keyboards::main_keyboard;

pub const STARTUP_MESSAGE: &str = "🟢 Bot started ✔";

/// Tells the owner the bot is up and gives them the admin menu.
pub async fn notify_owner_startup(bot: &Bot, owner_chat_id: Option<i64>) {
    let Some(chat_id) = owner_chat_id else {
        log::warn!("No owner chat configured, skipping startup notification");
        return;
    };

    if let Err(e) = bot
        .send_message(ChatId(chat_id), STARTUP_MESSAGE)
        .reply_markup(main_keyboard(true))
        .await
    {
        log::error!("Failed to send startup notification to {}: {}", chat_id, e);
    }
}

/// Best-effort plain text message.
pub async fn notify_text(bot: &Bot, chat_id: i64, text: &str) {
    if let Err(e) = bot.send_message(ChatId(chat_id), text).await {
        log::error!("Failed to send message to {}: {}", chat_id, e);
    }
}

/// Escapes text for MarkdownV2 outside of code blocks.
pub fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
    ];
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escapes text placed inside a MarkdownV2 ``` block.
pub fn escape_code_block(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`")
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
