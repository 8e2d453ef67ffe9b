//! Append-only logs of what users send to the bot.

use rusqlite::{params, Connection, Result};
use strum::{AsRefStr, Display, EnumString};

use crate::core::utils::truncate_chars;
use crate::storage::db::DbConnection;
use crate::storage::users::upsert_user;

/// Telegram messages are at most 4096 characters
pub const MESSAGE_MAX_LEN: usize = 4096;

/// Kind of interaction stored in the events table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EventType {
    Message,
    Callback,
    Command,
}

/// A stored event row
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub user_id: i64,
    pub event_type: String,
    pub details: serde_json::Value,
    pub created_at: String,
}

/// Stores a message text for the given internal user id.
pub fn save_message(conn: &Connection, user_id: i64, text: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (user_id, text) VALUES (?1, ?2)",
        params![user_id, truncate_chars(text, MESSAGE_MAX_LEN)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Stores an event with JSON details for the given internal user id.
pub fn save_event(conn: &Connection, user_id: i64, event_type: EventType, details: &serde_json::Value) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (user_id, event_type, details) VALUES (?1, ?2, ?3)",
        params![user_id, event_type.as_ref(), details.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Upserts the user and logs the interaction in one transaction.
///
/// `text` is stored in the messages table when present.
pub fn record_activity(
    conn: &mut DbConnection,
    telegram_id: i64,
    username: Option<&str>,
    event_type: EventType,
    details: &serde_json::Value,
    text: Option<&str>,
) -> Result<()> {
    let tx = conn.transaction()?;
    let user = upsert_user(&tx, telegram_id, username)?;
    tx.execute(
        "INSERT INTO events (user_id, event_type, details) VALUES (?1, ?2, ?3)",
        params![user.id, event_type.as_ref(), details.to_string()],
    )?;
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        tx.execute(
            "INSERT INTO messages (user_id, text) VALUES (?1, ?2)",
            params![user.id, truncate_chars(text, MESSAGE_MAX_LEN)],
        )?;
    }
    tx.commit()
}

/// Latest events of a user, newest first.
pub fn recent_events(conn: &Connection, user_id: i64, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, event_type, details, created_at FROM events
         WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit as i64], |row| {
        let details: String = row.get(3)?;
        Ok(Event {
            id: row.get(0)?,
            user_id: row.get(1)?,
            event_type: row.get(2)?,
            details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
            created_at: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Number of stored messages for a user.
pub fn count_messages(conn: &Connection, user_id: i64) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM messages WHERE user_id = ?1", params![user_id], |r| r.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::test_support::temp_pool;
    use crate::storage::users::{delete_user, get_user};
    use serde_json::json;

    #[test]
    fn test_record_activity_creates_user_event_and_message() {
        let (_dir, pool) = temp_pool();
        let mut conn = pool.get().unwrap();

        record_activity(&mut conn, 100, Some("carol"), EventType::Command, &json!({"command": "/start"}), Some("/start")).unwrap();
        record_activity(&mut conn, 100, Some("carol"), EventType::Callback, &json!({"data": "x"}), None).unwrap();

        let user = get_user(&conn, 100).unwrap().unwrap();
        let events = recent_events(&conn, user.id, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "callback");
        assert_eq!(events[1].details["command"], "/start");
        assert_eq!(count_messages(&conn, user.id).unwrap(), 1);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let user = upsert_user(&conn, 5, None).unwrap();
        save_message(&conn, user.id, &"я".repeat(5000)).unwrap();

        let stored: String = conn.query_row("SELECT text FROM messages", [], |r| r.get(0)).unwrap();
        assert_eq!(stored.chars().count(), MESSAGE_MAX_LEN);
    }

    #[test]
    fn test_deleting_user_cascades() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let user = upsert_user(&conn, 6, Some("dave")).unwrap();
        save_message(&conn, user.id, "hi").unwrap();
        save_event(&conn, user.id, EventType::Message, &json!({})).unwrap();

        assert!(delete_user(&conn, 6).unwrap());
        assert_eq!(count_messages(&conn, user.id).unwrap(), 0);
        assert!(recent_events(&conn, user.id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::Callback.to_string(), "callback");
        assert_eq!("command".parse::<EventType>().unwrap(), EventType::Command);
    }
}
