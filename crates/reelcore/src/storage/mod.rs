//! SQLite persistence: users, messages, events and image requests

pub mod activity;
pub mod db;
pub mod export;
pub mod migrations;
pub mod requests;
pub mod users;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
