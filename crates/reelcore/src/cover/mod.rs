//! Clickbait title and cover image for a video.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use indoc::indoc;
use rusttype::{point, Font, Scale};
use thiserror::Error;

use crate::core::utils::{save_next, truncate_chars};
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

const BLUR_SIGMA: f32 = 10.0;
const DARKEN_ALPHA: u8 = 120;
const GRADIENT_MAX_ALPHA: f32 = 160.0;
const MAX_FONT_SIZE: u32 = 72;
const MIN_FONT_SIZE: u32 = 28;
const FONT_STEP: usize = 2;
const PADDING: u32 = 40;
const LINE_SPACING: f32 = 1.3;
const STROKE: i32 = 3;

const TITLE_SYSTEM_PROMPT: &str = indoc! {r#"
    Ты профессиональный копирайтер для YouTube-роликов. Соблюдай правила:
    1. Анализируй суть промпта
    2. Генерируй яркий заголовок строго из 3-5 слов
    3. Используй: цифры, вопросы, эмоциональные прилагательные
    4. Добавляй 1-3 релевантных эмодзи в конце
    5. Запрещены: переносы слов, слэши, сложные термины

    Формат: [Заголовок] [Эмодзи]
    Примеры:
    - "ШОК! 5 секретов ИИ, которые изменят всё 🤯💻"
    - "Как нейросети видят будущее? 🔮👁️"
    - "2077: Квантовый прорыв в 3D 💥🚀"
"#};

/// Rough emoji test covering the pictograph blocks the LLM uses.
pub fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0x2300..=0x23FF | 0xFE0F)
}

/// Strips quotes and markdown; makes sure the title ends with an emoji.
pub fn clean_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    let cleaned: String = line
        .chars()
        .filter(|c| !matches!(c, '"' | '«' | '»' | '*' | '#' | '_' | '`' | '[' | ']'))
        .collect();
    let mut title = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if !title.chars().any(is_emoji) {
        title.push_str(" ✨");
    }
    title
}

/// Title used when the LLM is unavailable.
pub fn fallback_title(prompt: &str) -> String {
    format!("ИИ Революция: {} ✨", truncate_chars(prompt, 12))
}

/// Asks the LLM for a 3-5 word title; never fails.
pub async fn generate_title(chat: Option<&dyn ChatModel>, prompt: &str) -> String {
    let Some(chat) = chat else {
        return fallback_title(prompt);
    };
    log::info!("Starting title generation for prompt: {}", truncate_chars(prompt, 50));

    let request = ChatRequest::new(vec![
        ChatMessage::system(TITLE_SYSTEM_PROMPT),
        ChatMessage::user(format!("Создать заголовок для: {}", prompt)),
    ])
    .temperature(0.9)
    .max_tokens(80);

    match chat.complete(&request).await {
        Ok(raw) => {
            let title = clean_title(&raw);
            log::info!("Generated title: {}", title);
            title
        }
        Err(e) => {
            log::error!("Title generation failed: {}", e);
            fallback_title(prompt)
        }
    }
}

/// Loads a TrueType font, logging a warning when it can't be used.
pub fn load_font(path: &str) -> Option<Font<'static>> {
    match fs_err::read(path) {
        Ok(bytes) => {
            let font = Font::try_from_vec(bytes);
            if font.is_none() {
                log::warn!("{} is not a usable TrueType font", path);
            }
            font
        }
        Err(e) => {
            log::warn!("Failed to read font: {}", e);
            None
        }
    }
}

fn text_width(font: &Font<'_>, scale: Scale, text: &str) -> f32 {
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

/// Drops characters the font has no glyph for (emoji, mostly).
fn drawable_text(font: &Font<'_>, text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_whitespace() || font.glyph(*c).id().0 != 0)
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Greedy word wrap; a single word wider than `max_width` gets its own line.
pub fn wrap_text(font: &Font<'_>, scale: Scale, text: &str, max_width: f32) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(font, scale, &candidate) <= max_width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Largest font size (72 down to 28) at which the wrapped title fits.
///
/// Falls back to the minimum size when nothing fits.
pub fn fit_title(font: &Font<'_>, title: &str, width: u32, height: u32) -> (Scale, Vec<String>) {
    let max_width = width.saturating_sub(2 * PADDING) as f32;
    let max_height = height.saturating_sub(2 * PADDING) as f32;

    for size in (MIN_FONT_SIZE..=MAX_FONT_SIZE).rev().step_by(FONT_STEP) {
        let scale = Scale::uniform(size as f32);
        let lines = wrap_text(font, scale, title, max_width);
        let widest = lines.iter().map(|l| text_width(font, scale, l)).fold(0.0, f32::max);
        let total_height = lines.len() as f32 * size as f32 * LINE_SPACING;
        if widest <= max_width && total_height <= max_height {
            return (scale, lines);
        }
    }

    let scale = Scale::uniform(MIN_FONT_SIZE as f32);
    (scale, wrap_text(font, scale, title, max_width))
}

fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], coverage: f32) {
    let a = coverage.clamp(0.0, 1.0);
    for (channel, target) in pixel.0.iter_mut().take(3).zip(color) {
        *channel = (*channel as f32 * (1.0 - a) + target as f32 * a).round() as u8;
    }
}

fn draw_line(img: &mut RgbaImage, font: &Font<'_>, scale: Scale, x: f32, baseline: f32, text: &str, color: [u8; 3]) {
    let (width, height) = img.dimensions();
    for glyph in font.layout(text, scale, point(x, baseline)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = bb.min.x + gx as i32;
            let py = bb.min.y + gy as i32;
            if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                blend(img.get_pixel_mut(px as u32, py as u32), color, coverage);
            }
        });
    }
}

/// Blurs, darkens and shades the base image, then draws the title centered.
///
/// Without a font the cover is rendered without text.
pub fn render_cover(base: &DynamicImage, title: &str, font: Option<&Font<'_>>) -> RgbaImage {
    let mut img = imageops::blur(&base.to_rgba8(), BLUR_SIGMA);
    let (width, height) = img.dimensions();

    for (_, y, pixel) in img.enumerate_pixels_mut() {
        blend(pixel, [0, 0, 0], DARKEN_ALPHA as f32 / 255.0);
        // Transparent at the top, darkest at the bottom
        let gradient = GRADIENT_MAX_ALPHA * y as f32 / height.max(1) as f32;
        blend(pixel, [0, 0, 0], gradient / 255.0);
    }

    let Some(font) = font else {
        log::warn!("No font available, cover rendered without title");
        return img;
    };

    let text = drawable_text(font, title);
    if text.is_empty() {
        return img;
    }

    let (scale, lines) = fit_title(font, &text, width, height);
    let line_height = scale.y * LINE_SPACING;
    let ascent = font.v_metrics(scale).ascent;
    let block_height = lines.len() as f32 * line_height;
    let top = (height as f32 - block_height) / 2.0;

    for (i, line) in lines.iter().enumerate() {
        let x = (width as f32 - text_width(font, scale, line)) / 2.0;
        let baseline = top + i as f32 * line_height + ascent;
        for dx in -STROKE..=STROKE {
            for dy in -STROKE..=STROKE {
                if dx != 0 || dy != 0 {
                    draw_line(&mut img, font, scale, x + dx as f32, baseline + dy as f32, line, [0, 0, 0]);
                }
            }
        }
        draw_line(&mut img, font, scale, x, baseline, line, [255, 255, 255]);
    }

    img
}

/// Title plus cover_N.png from the base image.
pub struct CoverGenerator {
    chat: Option<Arc<dyn ChatModel>>,
    font: Option<Arc<Font<'static>>>,
    output_dir: PathBuf,
}

impl CoverGenerator {
    pub fn new(chat: Option<Arc<dyn ChatModel>>, font: Option<Font<'static>>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            chat,
            font: font.map(Arc::new),
            output_dir: output_dir.into(),
        }
    }

    /// Returns the cover path and the title.
    pub async fn generate(&self, base_image: &Path, prompt: &str) -> Result<(PathBuf, String), CoverError> {
        let title = generate_title(self.chat.as_deref(), prompt).await;

        let bytes = fs_err::tokio::read(base_image).await?;
        let font = self.font.clone();
        let render_title = title.clone();
        let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, CoverError> {
            let base = image::load_from_memory(&bytes)?;
            let cover = render_cover(&base, &render_title, font.as_deref());
            let mut buffer = Vec::new();
            cover.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
            Ok(buffer)
        })
        .await??;

        let path = save_next(&self.output_dir, "cover_", ".png", &png).await?;
        log::info!("🖼 Cover saved to {}", path.display());
        Ok((path, title))
    }
}
