//! Admin panel: host stats, logs, users, export, metrics, video runs

use std::io::ErrorKind;

use chrono::Utc;
use indoc::formatdoc;
use itertools::Itertools;
use reelcore::config;
use reelcore::core::logging::summarize_log;
use reelcore::core::metrics;
use reelcore::core::utils::truncate_chars;
use reelcore::get_connection;
use reelcore::storage::export::{export_tables_zip, users_csv};
use reelcore::storage::users::{self, User};
use rusqlite::Connection;
use sysinfo::{Disks, Networks, System};
use teloxide::prelude::*;
use teloxide::types::{InputFile, Message, ParseMode};

use super::common::require_admin;
use super::types::{HandlerDeps, HandlerResult};
use crate::scheduler::{run_video_job, BUSY_MESSAGE, UNAVAILABLE_MESSAGE};
use crate::telegram::delivery::TelegramDelivery;
use crate::telegram::keyboards::{admin_keyboard, main_keyboard};
use crate::telegram::notifications::{escape_code_block, escape_html, escape_markdown};

/// Days of log history summarized by the logs button
pub const LOG_DAYS: i64 = 3;
pub const LOG_LAST_ERRORS: usize = 5;
pub const LOG_TAIL_LINES: usize = 1000;
/// Rows shown in the chat table; the CSV always has everyone
pub const USERS_TABLE_LIMIT: usize = 50;

const BYTES_IN_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub async fn show_admin_panel(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    bot.send_message(msg.chat.id, "⚙️ Панель управления администратора:")
        .reply_markup(admin_keyboard())
        .await?;
    Ok(())
}

// System stats

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemSnapshot {
    pub cpu_usage: f32,
    pub cpu_count: usize,
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_available: u64,
    pub disk_total: u64,
    pub disk_available: u64,
    pub network_sent: u64,
    pub network_received: u64,
    pub uptime_secs: u64,
    pub os: Option<String>,
}

/// Blocks for the CPU sampling interval; call from `spawn_blocking`.
pub fn collect_system_snapshot() -> SystemSnapshot {
    let mut sys = System::new_all();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();

    let disks = Disks::new_with_refreshed_list();
    let networks = Networks::new_with_refreshed_list();

    SystemSnapshot {
        cpu_usage: sys.global_cpu_usage(),
        cpu_count: sys.cpus().len(),
        memory_total: sys.total_memory(),
        memory_used: sys.used_memory(),
        memory_available: sys.available_memory(),
        disk_total: disks.list().iter().map(|d| d.total_space()).sum(),
        disk_available: disks.list().iter().map(|d| d.available_space()).sum(),
        network_sent: networks.list().values().map(|n| n.total_transmitted()).sum(),
        network_received: networks.list().values().map(|n| n.total_received()).sum(),
        uptime_secs: System::uptime(),
        os: System::long_os_version(),
    }
}

fn gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / BYTES_IN_GB)
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3600;
    let minutes = secs % 3600 / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

pub fn format_system_stats(s: &SystemSnapshot) -> String {
    let disk_used = s.disk_total.saturating_sub(s.disk_available);
    formatdoc! {"
        🖥️ System Statistics 🖥️

        💻 CPU
        • Usage: {cpu:.1}%
        • Cores: {cores}

        🧠 Memory
        • Total: {mem_total}
        • Used: {mem_used}
        • Available: {mem_available}

        💾 Disk
        • Total: {disk_total}
        • Used: {disk_used}
        • Free: {disk_free}

        🌐 Network
        • Sent: {sent}
        • Received: {received}

        ⏱ Uptime: {uptime}
        🐧 OS: {os}",
        cpu = s.cpu_usage,
        cores = s.cpu_count,
        mem_total = gb(s.memory_total),
        mem_used = gb(s.memory_used),
        mem_available = gb(s.memory_available),
        disk_total = gb(s.disk_total),
        disk_used = gb(disk_used),
        disk_free = gb(s.disk_available),
        sent = gb(s.network_sent),
        received = gb(s.network_received),
        uptime = format_uptime(s.uptime_secs),
        os = s.os.as_deref().unwrap_or("unknown"),
    }
}

pub async fn handle_system_stats(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let snapshot = match tokio::task::spawn_blocking(collect_system_snapshot).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            log::error!("System stats collection failed: {}", e);
            bot.send_message(msg.chat.id, "⚠️ Ошибка получения системной информации")
                .await?;
            return Ok(());
        }
    };
    let text = format!("```\n{}\n```", escape_code_block(&format_system_stats(&snapshot)));
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}

// Logs

pub async fn handle_logs(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let path = config::LOG_FILE_PATH.as_str();
    let content = match fs_err::tokio::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            bot.send_message(msg.chat.id, "⚠️ Файл логов не найден").await?;
            return Ok(());
        }
        Err(e) => {
            log::error!("Failed to read log file {}: {}", path, e);
            bot.send_message(msg.chat.id, format!("❌ Ошибка обработки логов: {}", e))
                .await?;
            return Ok(());
        }
    };

    let summary = summarize_log(&content, Utc::now(), LOG_DAYS, LOG_TAIL_LINES);
    let report = truncate_chars(&summary.render(LOG_DAYS, LOG_LAST_ERRORS), 3800);
    bot.send_message(msg.chat.id, format!("<code>{}</code>", escape_html(&report)))
        .parse_mode(ParseMode::Html)
        .await?;

    if !summary.tail.is_empty() {
        let tail = summary.tail.join("\n").into_bytes();
        bot.send_document(msg.chat.id, InputFile::memory(tail).file_name("recent.log"))
            .caption("📎 Последние логи системы")
            .await?;
    }
    Ok(())
}

// Users

fn users_row(cells: [&str; 6]) -> String {
    format!(
        "{:<4} {:<12} {:<15} {:<5} {:<19} {:<19}\n",
        cells[0], cells[1], cells[2], cells[3], cells[4], cells[5]
    )
}

pub fn format_users_table(users: &[User]) -> String {
    let header = users_row(["ID", "Telegram ID", "Username", "Admin", "Created", "Last Active"]);
    let rows = users
        .iter()
        .take(USERS_TABLE_LIMIT)
        .map(|user| {
            let username = truncate_chars(user.username.as_deref().unwrap_or("-"), 14);
            users_row([
                &user.id.to_string(),
                &user.telegram_id.to_string(),
                &username,
                if user.is_admin { "✓" } else { "✗" },
                &user.created_at,
                &user.last_activity,
            ])
        })
        .join("");

    let mut out = header + &rows;
    if users.len() > USERS_TABLE_LIMIT {
        out.push_str(&format!("… и еще {}\n", users.len() - USERS_TABLE_LIMIT));
    }
    out
}

pub async fn handle_users(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let loaded = get_connection(&deps.db_pool)
        .map_err(|e| e.to_string())
        .and_then(|conn| {
            let all = users::get_all_users(&conn).map_err(|e| e.to_string())?;
            let csv = users_csv(&conn).map_err(|e| e.to_string())?;
            Ok((all, csv))
        });
    let (all, csv) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("Failed to load users: {}", e);
            bot.send_message(msg.chat.id, "❌ Ошибка получения списка пользователей")
                .await?;
            return Ok(());
        }
    };

    if all.is_empty() {
        bot.send_message(msg.chat.id, "📭 В системе пока нет пользователей").await?;
        return Ok(());
    }

    let text = format!(
        "{}\n```\n{}```",
        escape_markdown(&format!("Пользователи системы ({})", all.len())),
        escape_code_block(&format_users_table(&all)),
    );
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    bot.send_document(msg.chat.id, InputFile::memory(csv.into_bytes()).file_name("users.csv"))
        .caption("📊 Полный список пользователей")
        .await?;
    Ok(())
}

// Grant admin

#[derive(Debug, Clone, PartialEq)]
pub enum GrantResult {
    MissingId,
    InvalidId,
    NotFound,
    AlreadyAdmin,
    Granted(User),
}

impl GrantResult {
    pub fn message(&self) -> String {
        match self {
            Self::MissingId => "❌ Укажите ID пользователя: /grant_admin <user_id>".to_string(),
            Self::InvalidId => "❌ Некорректный формат ID пользователя".to_string(),
            Self::NotFound => "❌ Пользователь не найден".to_string(),
            Self::AlreadyAdmin => "ℹ️ Пользователь уже имеет права администратора".to_string(),
            Self::Granted(user) => format!("✅ Пользователь {} получил права администратора", user.display_name()),
        }
    }
}

/// Promotes the user named by `arg`, a Telegram id.
pub fn grant_admin(conn: &Connection, arg: &str) -> rusqlite::Result<GrantResult> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(GrantResult::MissingId);
    }
    let Ok(telegram_id) = arg.parse::<i64>() else {
        return Ok(GrantResult::InvalidId);
    };
    let Some(user) = users::get_user(conn, telegram_id)? else {
        return Ok(GrantResult::NotFound);
    };
    if user.is_admin {
        return Ok(GrantResult::AlreadyAdmin);
    }
    users::set_admin(conn, telegram_id, true)?;
    log::info!("👑 {} is now an admin", user.display_name());
    Ok(GrantResult::Granted(user))
}

pub async fn handle_grant_admin(bot: &Bot, msg: &Message, deps: &HandlerDeps, arg: &str) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let result = {
        let conn = get_connection(&deps.db_pool)?;
        grant_admin(&conn, arg)?
    };
    bot.send_message(msg.chat.id, result.message()).await?;

    if let GrantResult::Granted(user) = result {
        if let Err(e) = bot
            .send_message(ChatId(user.telegram_id), "🎉 Вам выданы права администратора!")
            .reply_markup(main_keyboard(true))
            .await
        {
            log::warn!("Failed to notify new admin {}: {}", user.telegram_id, e);
        }
    }
    Ok(())
}

// Export and metrics

pub async fn handle_export(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let archive = get_connection(&deps.db_pool)
        .map_err(|e| e.to_string())
        .and_then(|conn| export_tables_zip(&conn).map_err(|e| e.to_string()));
    match archive {
        Ok(bytes) => {
            bot.send_document(msg.chat.id, InputFile::memory(bytes).file_name("tables.zip"))
                .caption("📦 Все таблицы в CSV")
                .await?;
        }
        Err(e) => {
            log::error!("Export failed: {}", e);
            bot.send_message(msg.chat.id, "❌ Ошибка экспорта").await?;
        }
    }
    Ok(())
}

pub async fn handle_metrics(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let text = metrics::render();
    bot.send_document(msg.chat.id, InputFile::memory(text.into_bytes()).file_name("metrics.txt"))
        .caption("📈 Метрики Prometheus")
        .await?;
    Ok(())
}

// Video

/// Starts a video run in the background and replies immediately.
pub async fn handle_generate_video(bot: &Bot, msg: &Message, deps: &HandlerDeps, upload: bool) -> HandlerResult {
    if !require_admin(bot, msg, deps).await? {
        return Ok(());
    }
    let job = deps.services.video_job.clone();
    if job.pipeline().is_none() {
        bot.send_message(msg.chat.id, UNAVAILABLE_MESSAGE).await?;
        return Ok(());
    }
    if job.is_running() {
        bot.send_message(msg.chat.id, BUSY_MESSAGE).await?;
        return Ok(());
    }

    let chat_id = msg.chat.id.0;
    let delivery = TelegramDelivery::new(bot.clone());
    let dialogs = deps.dialogs.clone();
    log::info!("🎬 Video generation requested in chat {} (upload: {})", chat_id, upload);
    tokio::spawn(async move {
        run_video_job(&job, &delivery, &dialogs, chat_id, upload).await;
    });

    let text = if upload {
        "✅ Генерация видео запущена"
    } else {
        "✅ Генерация видео запущена без загрузки"
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
