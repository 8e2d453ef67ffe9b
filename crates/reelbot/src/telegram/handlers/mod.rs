//! Telegram bot handler tree configuration
//!
//! The handlers are organized in a testable way, allowing integration tests
//! to use the same handler tree as production code.

pub mod admin;
mod audio;
mod auth;
pub mod common;
mod generation;
pub mod memory;
mod schema;
mod types;

pub use generation::generate_images;
pub use schema::schema;
pub use types::{sender_id, HandlerDeps, HandlerError, HandlerResult};
