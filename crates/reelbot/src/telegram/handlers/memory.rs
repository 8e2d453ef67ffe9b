//! Diffusion backend memory statistics

use reelcore::diffusion::MemoryStats;
use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{HandlerDeps, HandlerResult};

const BYTES_IN_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Bytes as "X.XX GB", or "N/A" for missing (non-positive) values.
pub fn format_gb(bytes: f64) -> String {
    if bytes > 0.0 {
        format!("{:.2} GB", bytes / BYTES_IN_GB)
    } else {
        "N/A".to_string()
    }
}

pub fn format_memory_stats(stats: &MemoryStats) -> String {
    format!(
        "📊 Статистика памяти:\n\
         • Использовано: {}\n\
         • Свободно: {}\n\
         • Всего: {}\n\
         \n💻 VRAM статистика:\n\
         • Выделено: {}\n\
         • Зарезервировано: {}",
        format_gb(stats.ram.used),
        format_gb(stats.ram.free),
        format_gb(stats.ram.total),
        format_gb(stats.cuda.allocated.current),
        format_gb(stats.cuda.reserved.current),
    )
}

pub async fn handle_memory(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> HandlerResult {
    let text = match deps.services.sd.memory().await {
        Ok(stats) => format_memory_stats(&stats),
        Err(e) => {
            log::error!("Failed to get SD memory stats: {}", e);
            "⚠️ Не удалось получить данные о памяти".to_string()
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
