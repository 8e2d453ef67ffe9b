//! Telegram side of the bot: commands, keyboards, dialogs and delivery

pub mod bot;
pub mod delivery;
pub mod dialogue;
pub mod handlers;
pub mod keyboards;
pub mod notifications;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use delivery::TelegramDelivery;
pub use handlers::{schema, HandlerDeps, HandlerError};
