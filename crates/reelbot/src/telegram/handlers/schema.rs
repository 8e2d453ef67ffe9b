//! Dispatcher schema and handler chain builders

use reelcore::get_connection;
use reelcore::storage::activity::{record_activity, EventType};
use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{Message, UpdateKind};

use super::types::{HandlerDeps, HandlerError, HandlerResult};
use super::{admin, audio, auth, common, generation, memory};
use crate::telegram::bot::Command;
use crate::telegram::dialogue::Transition;
use crate::telegram::keyboards::{
    BTN_ADMIN_PANEL, BTN_EXPORT, BTN_GENERATE_AUDIO, BTN_GENERATE_IMAGES, BTN_HOME, BTN_LOGS, BTN_MEMORY_STATS,
    BTN_SYSTEM_STATS, BTN_USERS, BTN_VIDEO_NO_UPLOAD, BTN_VIDEO_UPLOAD, BTN_YOUTUBE_AUTH,
};

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same schema is used in production and in integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_activity = deps.clone();
    let deps_commands = deps.clone();
    let deps_messages = deps;

    dptree::entry()
        // Records activity, never matches
        .branch(activity_handler(deps_activity))
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
}

/// Upserts the sender and stores an event (and the text) for every update.
fn activity_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    dptree::filter(move |update: Update| {
        record_update(&deps, &update);
        false
    })
    .endpoint(|| async { Ok::<(), HandlerError>(()) })
}

fn record_update(deps: &HandlerDeps, update: &Update) {
    let (user, event_type, details, text) = match &update.kind {
        UpdateKind::Message(msg) => {
            let text = msg.text();
            let event_type = if text.is_some_and(|t| t.starts_with('/')) {
                EventType::Command
            } else {
                EventType::Message
            };
            let details = serde_json::json!({
                "chat_id": msg.chat.id.0,
                "message_id": msg.id.0,
                "text": text,
            });
            (msg.from.as_ref(), event_type, details, text)
        }
        UpdateKind::CallbackQuery(query) => {
            let details = serde_json::json!({ "data": query.data });
            (Some(&query.from), EventType::Callback, details, None)
        }
        _ => return,
    };
    let Some(user) = user else { return };
    let Ok(telegram_id) = i64::try_from(user.id.0) else {
        return;
    };

    let result = get_connection(&deps.db_pool)
        .map_err(|e| e.to_string())
        .and_then(|mut conn| {
            record_activity(&mut conn, telegram_id, user.username.as_deref(), event_type, &details, text)
                .map_err(|e| e.to_string())
        });
    if let Err(e) = result {
        log::error!("Failed to record activity for {}: {}", telegram_id, e);
    }
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);

                match cmd {
                    Command::Start => common::handle_start(&bot, &msg, &deps).await?,
                    Command::Generate => generation::start_image_dialog(&bot, &msg, &deps).await?,
                    Command::Memory => memory::handle_memory(&bot, &msg, &deps).await?,
                    Command::Cancel => common::handle_cancel(&bot, &msg, &deps).await?,
                    Command::Auth => auth::start_auth(&bot, &msg, &deps).await?,
                    Command::Export => admin::handle_export(&bot, &msg, &deps).await?,
                    Command::Metrics => admin::handle_metrics(&bot, &msg, &deps).await?,
                    Command::GrantAdmin(arg) => admin::handle_grant_admin(&bot, &msg, &deps, &arg).await?,
                }
                Ok(())
            }
        },
    ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let text = msg.text().unwrap_or_default().to_string();
                if let Err(e) = route_text(&bot, &msg, &deps, &text).await {
                    log::error!("❌ Failed to handle message in chat {}: {}", msg.chat.id, e);
                    let _ = bot.send_message(msg.chat.id, common::ERROR_MESSAGE).await;
                }
                Ok(())
            }
        })
}

/// Active dialogs get the text first; otherwise it is matched against the menu buttons.
async fn route_text(bot: &Bot, msg: &Message, deps: &HandlerDeps, text: &str) -> HandlerResult {
    if let Some(state) = deps.dialogs.get(msg.chat.id.0) {
        let transition = state.on_input(text);
        return apply_transition(bot, msg, deps, transition).await;
    }

    match text {
        BTN_MEMORY_STATS => memory::handle_memory(bot, msg, deps).await,
        BTN_GENERATE_IMAGES => generation::start_image_dialog(bot, msg, deps).await,
        BTN_GENERATE_AUDIO => audio::start_audio_dialog(bot, msg, deps).await,
        BTN_ADMIN_PANEL => admin::show_admin_panel(bot, msg, deps).await,
        BTN_SYSTEM_STATS => admin::handle_system_stats(bot, msg, deps).await,
        BTN_LOGS => admin::handle_logs(bot, msg, deps).await,
        BTN_USERS => admin::handle_users(bot, msg, deps).await,
        BTN_EXPORT => admin::handle_export(bot, msg, deps).await,
        BTN_VIDEO_UPLOAD => admin::handle_generate_video(bot, msg, deps, true).await,
        BTN_VIDEO_NO_UPLOAD => admin::handle_generate_video(bot, msg, deps, false).await,
        BTN_YOUTUBE_AUTH => auth::start_auth(bot, msg, deps).await,
        BTN_HOME => common::back_to_main(bot, msg, deps).await,
        _ => {
            log::debug!("Ignoring free text in chat {}", msg.chat.id);
            Ok(())
        }
    }
}

async fn apply_transition(bot: &Bot, msg: &Message, deps: &HandlerDeps, transition: Transition) -> HandlerResult {
    let chat_id = msg.chat.id.0;
    match transition {
        Transition::Move(state, reply) => {
            deps.dialogs.set(chat_id, state);
            generation::send_reply(bot, msg, deps, reply).await
        }
        Transition::Generate(draft) => {
            deps.dialogs.clear(chat_id);
            generation::handle_generate(bot, msg, deps, draft).await
        }
        Transition::Synthesize(text) => {
            deps.dialogs.clear(chat_id);
            audio::handle_synthesize(bot, msg, deps, &text).await
        }
        Transition::ExchangeCode { code, pending } => {
            deps.dialogs.clear(chat_id);
            auth::handle_auth_code(bot, msg, deps, &code, pending).await
        }
        Transition::Cancel => common::handle_cancel(bot, msg, deps).await,
    }
}
