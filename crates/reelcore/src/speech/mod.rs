//! Narration text and speech synthesis (SaluteSpeech).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use indoc::{formatdoc, indoc};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config;
use crate::core::utils::{pick, save_next};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, LlmError};
use crate::oauth::{TokenError, TokenProvider};

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("narration text error: {0}")]
    Llm(#[from] LlmError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TTS API returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("text is empty")]
    EmptyText,
}

/// Text to WAV bytes.
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError>;
}

/// SaluteSpeech `text:synthesize` REST endpoint.
pub struct SaluteSpeechClient {
    http: reqwest::Client,
    url: String,
    tokens: Arc<TokenProvider>,
}

impl SaluteSpeechClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            url: url.into(),
            tokens,
        }
    }

    pub fn from_env(http: reqwest::Client, tokens: Arc<TokenProvider>) -> Self {
        Self::new(http, config::sber::TTS_URL.as_str(), tokens)
    }
}

#[async_trait]
impl SpeechSynth for SaluteSpeechClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }
        let token = self.tokens.get_token()?;

        log::debug!("Sending {} chars to TTS with voice {}", text.chars().count(), voice);
        let response = self
            .http
            .post(&self.url)
            .query(&[("format", "wav16"), ("voice", voice)])
            .bearer_auth(token.expose_secret())
            .header("Content-Type", "application/text")
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .body(text.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("TTS HTTP error {}: {}", status, body);
            return Err(SpeechError::Status { status, body });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

const SCRIPTWRITER_RULES: &str = indoc! {"
    Вы профессиональный русскоязычный сценарист. Жесткие правила:
    1. ТОЛЬКО единый связный текст без списков и пунктов
    2. Запрещены: нумерация, маркированные пункты, выделения жирным или курсивом, заголовки, разделители
    3. Строго 20-25 предложений (~800 символов)
    4. Плавные переходы между предложениями
    5. Используй союзы (однако, тем временем, постепенно), наречия времени (медленно, стремительно, затем), причастные и деепричастные обороты
    6. Каждые 3-5 предложений описывают один аспект визуала
    7. Сохраняй хронологический порядок как в видео
"};

fn narration_request(prompt: &str) -> ChatRequest {
    let task = formatdoc! {"
        Сгенерируйте ЕДИНЫЙ текст для озвучки без разрывов и списков. Требования:
        - Плавное описание сцен как в документальном фильме
        - Естественные переходы между объектами (слева направо, фон->передний план)
        - Хронология должна точно соответствовать видеоряду: {prompt}
        - Каждое новое предложение развивает предыдущее
        - Запрещены резкие скачки между темами

        Начни сразу с описания первого кадра.
    ", prompt = prompt};
    ChatRequest::new(vec![ChatMessage::user(SCRIPTWRITER_RULES), ChatMessage::user(task)])
}

/// Writes narration with the LLM and voices it.
pub struct NarrationGenerator {
    chat: Arc<dyn ChatModel>,
    speech: Arc<dyn SpeechSynth>,
    voices: Vec<String>,
    output_dir: PathBuf,
}

impl NarrationGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, speech: Arc<dyn SpeechSynth>, voices: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            chat,
            speech,
            voices,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn random_voice(&self) -> &str {
        pick(&self.voices).map(String::as_str).unwrap_or("Nec_24000")
    }

    /// Narration for the video described by `prompt`, saved as sound_N.wav.
    ///
    /// Returns the audio path and the narration text.
    pub async fn generate_audio(&self, prompt: &str) -> Result<(PathBuf, String), SpeechError> {
        let text = self.chat.complete(&narration_request(prompt)).await?;
        log::info!("🗣 Narration text ({} chars): {}", text.chars().count(), text);

        let voice = self.random_voice().to_string();
        let path = self.generate_audio_file(&text, Some(&voice)).await?;
        Ok((path, text))
    }

    /// Voices arbitrary text; a random voice is used when none is given.
    pub async fn generate_audio_file(&self, text: &str, voice: Option<&str>) -> Result<PathBuf, SpeechError> {
        let voice = voice.unwrap_or_else(|| self.random_voice());
        log::info!("Generating audio file with voice {}", voice);
        let audio = self.speech.synthesize(text, voice).await?;
        let path = save_next(&self.output_dir, "sound_", ".wav", &audio).await?;
        log::info!("🔊 Audio saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narration_request_mentions_prompt() {
        let request = narration_request("robotic samurai");
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.contains("видеоряду: robotic samurai"));
    }
}
