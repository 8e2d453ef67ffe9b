//! Bot initialization
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Command list registration

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use reelcore::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "Я умею:")]
pub enum Command {
    #[command(description = "показывает главное меню")]
    Start,
    #[command(description = "генерация изображений")]
    Generate,
    #[command(description = "статистика памяти SD")]
    Memory,
    #[command(description = "отменить текущее действие")]
    Cancel,
    #[command(description = "авторизация YouTube (только для администраторов)")]
    Auth,
    #[command(description = "выгрузка таблиц в CSV (только для администраторов)")]
    Export,
    #[command(description = "метрики Prometheus (только для администраторов)")]
    Metrics,
    #[command(description = "выдать права администратора (только для администраторов)")]
    GrantAdmin(String),
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot (invalid URL, empty token, etc.)
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.as_str();
    if token.is_empty() {
        anyhow::bail!("BOT_TOKEN is not set");
    }

    let client = ClientBuilder::new()
        .timeout(config::telegram::request_timeout())
        .build()?;
    let bot = Bot::with_client(token, client);

    let bot = match std::env::var("BOT_API_URL") {
        Ok(bot_api_url) if !bot_api_url.trim().is_empty() => {
            log::info!("Using custom Bot API URL: {}", bot_api_url);
            let url = url::Url::parse(&bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        _ => bot,
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "показывает главное меню"),
        BotCommand::new("generate", "генерация изображений"),
        BotCommand::new("memory", "статистика памяти SD"),
        BotCommand::new("cancel", "отменить текущее действие"),
        BotCommand::new("auth", "авторизация YouTube"),
        BotCommand::new("export", "выгрузка таблиц в CSV"),
        BotCommand::new("grant_admin", "выдать права администратора"),
    ])
    .await?;

    Ok(())
}
