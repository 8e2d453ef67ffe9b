use once_cell::sync::Lazy;
use secrecy::SecretString;
use std::env;
use std::time::Duration;

/// Reads an env var, treating empty values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    non_empty("BOT_TOKEN")
        .or_else(|| non_empty("TELOXIDE_TOKEN"))
        .unwrap_or_default()
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| non_empty("DATABASE_PATH").unwrap_or_else(|| "database.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: logs/bot.log (the admin "logs" button reads the same file)
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| non_empty("LOG_FILE_PATH").unwrap_or_else(|| "logs/bot.log".to_string()));

/// Log level for both console and file output (error/warn/info/debug/trace)
pub static LOG_LEVEL: Lazy<String> = Lazy::new(|| non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()));

/// Telegram IDs with admin rights, promoted at startup.
///
/// Read from ADMIN_IDS (comma-separated), falling back to USER_ID.
/// The first entry also receives scheduled videos and startup notifications.
pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
    let raw = non_empty("ADMIN_IDS").or_else(|| non_empty("USER_ID")).unwrap_or_default();
    parse_id_list(&raw)
});

/// Parses a comma-separated list of Telegram IDs, skipping garbage.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    log::warn!("Ignoring invalid admin id '{}'", part);
                    None
                }
            }
        })
        .collect()
}

/// Chat that receives scheduled videos and startup notifications
pub fn owner_chat_id() -> Option<i64> {
    ADMIN_IDS.first().copied()
}

/// Root of the generated media tree (generated/, sequential/, covers/, sound/, video/)
pub static OUTPUT_DIR: Lazy<String> = Lazy::new(|| non_empty("OUTPUT_DIR").unwrap_or_else(|| "output".to_string()));

/// Which prompt generator the pipeline uses: SIMPLE or GIGACHAT
pub static PROMPT_TYPE: Lazy<String> =
    Lazy::new(|| non_empty("PROMPT_TYPE").unwrap_or_else(|| "SIMPLE".to_string()));

/// TrueType font used for cover titles. Covers are rendered without text if unset.
pub static FONT_PATH: Lazy<Option<String>> = Lazy::new(|| {
    non_empty("FONT_PATH").or_else(|| {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
        ]
        .iter()
        .find(|p| std::path::Path::new(p).exists())
        .map(|p| p.to_string())
    })
});

/// Extra root certificate (PEM or DER) trusted by the Sber clients
pub static CA_BUNDLE_FILE: Lazy<Option<String>> = Lazy::new(|| non_empty("CA_BUNDLE_FILE"));

/// Stable Diffusion WebUI backend
pub mod sd {
    use super::{non_empty, Duration, Lazy};

    /// Base URL of the WebUI API
    pub static API_URL: Lazy<String> =
        Lazy::new(|| non_empty("SD_API_URL").unwrap_or_else(|| "http://sd_webui_back:7860".to_string()));

    /// Long-running generations are allowed up to 10 hours
    pub const REQUEST_TIMEOUT_SECS: u64 = 60 * 60 * 10;

    /// Progress polling gives up quickly and reports "no data"
    pub const PROGRESS_TIMEOUT_SECS: u64 = 5;

    pub fn request_timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }

    pub fn progress_timeout() -> Duration {
        Duration::from_secs(PROGRESS_TIMEOUT_SECS)
    }
}

/// Sber OAuth, GigaChat and SaluteSpeech
pub mod sber {
    use super::{non_empty, Duration, Lazy, SecretString};

    pub static OAUTH_URL: Lazy<String> = Lazy::new(|| {
        non_empty("SBER_OAUTH_URL").unwrap_or_else(|| "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string())
    });

    pub static GIGACHAT_URL: Lazy<String> = Lazy::new(|| {
        non_empty("GIGACHAT_API_URL")
            .unwrap_or_else(|| "https://gigachat.devices.sberbank.ru/api/v1/chat/completions".to_string())
    });

    pub static TTS_URL: Lazy<String> = Lazy::new(|| {
        non_empty("SALUTE_TTS_URL").unwrap_or_else(|| "https://smartspeech.sber.ru/rest/v1/text:synthesize".to_string())
    });

    pub static GIGACHAT_MODEL: Lazy<String> =
        Lazy::new(|| non_empty("GIGACHAT_MODEL").unwrap_or_else(|| "GigaChat".to_string()));

    /// Base64 "client_id:client_secret" authorization key for GigaChat
    pub static GIGACHAT_CREDENTIALS: Lazy<Option<SecretString>> =
        Lazy::new(|| non_empty("GIGACHAT_CREDENTIALS").map(SecretString::from));

    /// Base64 authorization key for SaluteSpeech
    pub static SALUT_CREDENTIALS: Lazy<Option<SecretString>> =
        Lazy::new(|| non_empty("SALUT_CREDENTIALS").map(SecretString::from));

    pub const GIGACHAT_SCOPE: &str = "GIGACHAT_API_PERS";
    pub const SALUT_SCOPE: &str = "SALUTE_SPEECH_PERS";

    /// Voices picked at random for narration
    pub static VOICES: Lazy<Vec<String>> = Lazy::new(|| {
        let raw = non_empty("VOICES").unwrap_or_else(|| "Nec_24000,Bys_24000,May_24000,Tur_24000,Ost_24000,Pon_24000".to_string());
        raw.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect()
    });

    /// How long startup waits for the first token
    pub const TOKEN_READY_TIMEOUT_SECS: u64 = 10;
    /// Refresh this long before the token expires
    pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;
    /// Never refresh more often than this
    pub const TOKEN_MIN_REFRESH_SECS: u64 = 60;
    /// Pause after a failed token request
    pub const TOKEN_RETRY_SECS: u64 = 5;
    /// Timeout for OAuth, chat and TTS HTTP calls
    pub const HTTP_TIMEOUT_SECS: u64 = 60;

    pub fn token_ready_timeout() -> Duration {
        Duration::from_secs(TOKEN_READY_TIMEOUT_SECS)
    }

    pub fn http_timeout() -> Duration {
        Duration::from_secs(HTTP_TIMEOUT_SECS)
    }
}

/// Video pipeline parameters
pub mod video {
    use super::{non_empty, Lazy};

    /// Number of chained img2img variations per video
    pub static ITERATIONS: Lazy<usize> =
        Lazy::new(|| non_empty("VIDEO_ITERATIONS").and_then(|v| v.parse().ok()).unwrap_or(240));

    /// Upper bound on full pipeline regenerations per scheduled run
    pub static MAX_ATTEMPTS: Lazy<u32> =
        Lazy::new(|| non_empty("VIDEO_MAX_ATTEMPTS").and_then(|v| v.parse().ok()).unwrap_or(10));

    pub const FPS: u32 = 24;
    pub const FIRST_FRAME_SECS: f64 = 1.0;
    pub const FRAME_SECS: f64 = 0.5;

    /// Accepted duration window in minutes, both ends exclusive
    pub const MIN_DURATION_MINUTES: f64 = 0.5;
    pub const MAX_DURATION_MINUTES: f64 = 1.0;

    /// Delay between img2img steps, in milliseconds
    pub const STEP_DELAY_MS: u64 = 1000;
}

/// YouTube upload
pub mod upload {
    use super::{non_empty, Lazy};

    /// Authorized-user credentials written by the OAuth flow
    pub static TOKEN_FILE: Lazy<String> =
        Lazy::new(|| non_empty("YOUTUBE_TOKEN_FILE").unwrap_or_else(|| "token.json".to_string()));

    /// OAuth client secrets downloaded from the Google console
    pub static CLIENT_SECRETS_FILE: Lazy<String> =
        Lazy::new(|| non_empty("YOUTUBE_CLIENT_SECRETS").unwrap_or_else(|| "client_secrets.json".to_string()));

    pub static API_BASE: Lazy<String> =
        Lazy::new(|| non_empty("YOUTUBE_API_BASE").unwrap_or_else(|| "https://www.googleapis.com".to_string()));

    pub const SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
    pub const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
    pub const CATEGORY_ID: &str = "22";
    pub const PRIVACY_STATUS: &str = "public";

    pub const MAX_RETRIES: u32 = 10;
    pub const RETRIABLE_STATUS_CODES: [u16; 4] = [500, 502, 503, 504];

    /// Chunk size for resumable uploads (must be a multiple of 256 KiB)
    pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;
}

/// Weekly schedule for automatic videos
pub mod schedule {
    use super::{non_empty, Lazy};

    /// Enables the scheduler task (NEED_SCHEDULER=false disables it)
    pub static ENABLED: Lazy<bool> = Lazy::new(|| {
        non_empty("NEED_SCHEDULER")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true)
    });

    /// Upload scheduled videos to YouTube after delivery
    pub static AUTO_UPLOAD: Lazy<bool> = Lazy::new(|| {
        non_empty("SCHEDULE_UPLOAD")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(true)
    });

    /// UTC offset of the schedule, e.g. "+03:00" (Europe/Moscow)
    pub static UTC_OFFSET: Lazy<String> =
        Lazy::new(|| non_empty("SCHEDULE_UTC_OFFSET").unwrap_or_else(|| "+03:00".to_string()));

    pub const HOUR: u32 = 12;
    pub const MINUTE: u32 = 0;
}

/// Telegram delivery limits
pub mod telegram {
    use super::Duration;

    /// Telegram accepts at most 10 items per media group
    pub const MEDIA_GROUP_SIZE: usize = 10;
    /// Pause between consecutive media groups
    pub const MEDIA_GROUP_DELAY_SECS: u64 = 5;
    /// HTTP timeout for Bot API requests (uploads of videos can be slow)
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;

    pub fn media_group_delay() -> Duration {
        Duration::from_secs(MEDIA_GROUP_DELAY_SECS)
    }

    pub fn request_timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}
