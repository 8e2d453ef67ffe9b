//! Reelforge core - everything the bot needs that does not touch Telegram.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, retry, process helpers, metrics
//! - `storage`: SQLite pool, migrations, users/messages/events/requests, CSV export
//! - `diffusion`: Stable Diffusion WebUI client and the img2img variation chain
//! - `oauth`: bearer token provider with a background refresh task
//! - `llm`: chat-completion client
//! - `prompt`: image prompt generators
//! - `speech`: narration text and speech synthesis
//! - `cover`: clickbait title and cover rendering
//! - `compose`: ffmpeg video compositor
//! - `upload`: YouTube resumable upload and OAuth code flow
//! - `pipeline`: the video generation orchestrator
//! - `schedule`: weekly fire-time calculation

pub mod compose;
pub mod core;
pub mod cover;
pub mod diffusion;
pub mod llm;
pub mod oauth;
pub mod pipeline;
pub mod prompt;
pub mod schedule;
pub mod speech;
pub mod storage;
pub mod upload;

pub use core::{config, AppError, AppResult};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
