//! Reply keyboards and their button labels
//!
//! The bot is driven by reply keyboards: incoming text is matched against
//! these labels, so the constants are the routing keys as well.

use teloxide::types::{KeyboardButton, KeyboardMarkup, KeyboardRemove};

// Main menu
pub const BTN_MEMORY_STATS: &str = "📊 Статистика памяти";
pub const BTN_ADMIN_PANEL: &str = "👑 Админ-панель";
pub const BTN_GENERATE_IMAGES: &str = "🖼 Генерация изображений";
pub const BTN_GENERATE_AUDIO: &str = "🔊 Генерация аудио";

// Admin panel
pub const BTN_SYSTEM_STATS: &str = "📊 Системная статистика";
pub const BTN_LOGS: &str = "📝 Логи действий";
pub const BTN_USERS: &str = "👥 Пользователи";
pub const BTN_EXPORT: &str = "📦 Экспорт CSV";
pub const BTN_VIDEO_UPLOAD: &str = "🎥 Сгенерировать видео (с загрузкой)";
pub const BTN_VIDEO_NO_UPLOAD: &str = "🎥 Сгенерировать видео (без загрузки)";
pub const BTN_YOUTUBE_AUTH: &str = "🔑 Авторизация YouTube";
pub const BTN_HOME: &str = "🔙 На главную";

// Image parameters
pub const BTN_SIZE: &str = "📐 Размер";
pub const BTN_QUANTITY: &str = "🔢 Количество";
pub const BTN_STEPS: &str = "📉 Шаги";
pub const BTN_CFG: &str = "⚖️ CFG Scale";
pub const BTN_SAMPLER: &str = "🎛 Сэмплер";
pub const BTN_NEGATIVE: &str = "🚫 Отрицательный";
pub const BTN_FACES: &str = "👥 Лица";
pub const BTN_GENERATE: &str = "🚀 Сгенерировать!";
pub const BTN_BACK: &str = "↩️ Назад";
pub const BTN_FACES_ON: &str = "✅ Включить";
pub const BTN_FACES_OFF: &str = "❌ Выключить";

pub const SIZES: [&str; 3] = ["512x512", "768x768", "1024x1024"];

fn rows(labels: &[&[&str]]) -> Vec<Vec<KeyboardButton>> {
    labels
        .iter()
        .map(|row| row.iter().map(|label| KeyboardButton::new(*label)).collect())
        .collect()
}

/// Main menu; the admin panel button is only shown to admins.
pub fn main_keyboard(is_admin: bool) -> KeyboardMarkup {
    let mut buttons = rows(&[&[BTN_MEMORY_STATS], &[BTN_GENERATE_IMAGES, BTN_GENERATE_AUDIO]]);
    if is_admin {
        buttons.push(vec![KeyboardButton::new(BTN_ADMIN_PANEL)]);
    }
    KeyboardMarkup::new(buttons)
        .resize_keyboard()
        .input_field_placeholder("Выберите действие...")
}

pub fn admin_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(rows(&[
        &[BTN_SYSTEM_STATS, BTN_LOGS],
        &[BTN_USERS, BTN_EXPORT],
        &[BTN_VIDEO_UPLOAD],
        &[BTN_VIDEO_NO_UPLOAD],
        &[BTN_YOUTUBE_AUTH],
        &[BTN_HOME],
    ]))
    .resize_keyboard()
    .input_field_placeholder("Выберите команду управления")
}

pub fn parameters_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(rows(&[
        &[BTN_SIZE, BTN_QUANTITY],
        &[BTN_STEPS, BTN_CFG],
        &[BTN_SAMPLER, BTN_NEGATIVE],
        &[BTN_FACES],
        &[BTN_GENERATE],
        &[BTN_BACK],
    ]))
    .resize_keyboard()
}

pub fn size_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(rows(&[&SIZES, &[BTN_BACK]])).resize_keyboard()
}

pub fn faces_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(rows(&[&[BTN_FACES_ON, BTN_FACES_OFF], &[BTN_BACK]])).resize_keyboard()
}

/// One sampler per row, then Back.
pub fn samplers_keyboard<S: AsRef<str>>(names: &[S]) -> KeyboardMarkup {
    let mut buttons: Vec<Vec<KeyboardButton>> = names
        .iter()
        .map(|name| vec![KeyboardButton::new(name.as_ref())])
        .collect();
    buttons.push(vec![KeyboardButton::new(BTN_BACK)]);
    KeyboardMarkup::new(buttons).resize_keyboard()
}

/// Only a Back button, for free-text parameter prompts.
pub fn back_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(rows(&[&[BTN_BACK]])).resize_keyboard()
}

pub fn remove_keyboard() -> KeyboardRemove {
    KeyboardRemove::new()
}
