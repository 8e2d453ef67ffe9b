//! Handler types, dependencies, and user helpers

use std::sync::Arc;

use reelcore::storage::users::{self, User};
use reelcore::{get_connection, DbPool};
use teloxide::types::Message;

use crate::services::Services;
use crate::telegram::dialogue::DialogStore;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type HandlerResult = Result<(), HandlerError>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub services: Arc<Services>,
    pub dialogs: Arc<DialogStore>,
}

impl HandlerDeps {
    pub fn new(db_pool: Arc<DbPool>, services: Arc<Services>, dialogs: Arc<DialogStore>) -> Self {
        Self {
            db_pool,
            services,
            dialogs,
        }
    }

    /// Admin flag from the database; lookup errors count as "not admin".
    pub fn is_admin(&self, telegram_id: i64) -> bool {
        let result = get_connection(&self.db_pool)
            .map_err(|e| e.to_string())
            .and_then(|conn| users::is_admin(&conn, telegram_id).map_err(|e| e.to_string()));
        match result {
            Ok(admin) => admin,
            Err(e) => {
                log::error!("Failed to check admin rights for {}: {}", telegram_id, e);
                false
            }
        }
    }

    /// Creates the user on first contact and refreshes the username otherwise.
    pub fn ensure_user(&self, msg: &Message) -> Result<User, HandlerError> {
        let conn = get_connection(&self.db_pool)?;
        let user = users::upsert_user(&conn, sender_id(msg), sender_username(msg).as_deref())?;
        Ok(user)
    }
}

/// Telegram id of the sender, falling back to the chat id.
pub fn sender_id(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .and_then(|u| i64::try_from(u.id.0).ok())
        .unwrap_or(msg.chat.id.0)
}

pub fn sender_username(msg: &Message) -> Option<String> {
    msg.from.as_ref().and_then(|u| u.username.clone())
}
