use rusqlite::{params, Connection, OptionalExtension, Result, Row};

use crate::core::utils::truncate_chars;

/// Maximum stored username length
pub const USERNAME_MAX_LEN: usize = 50;

/// A Telegram user known to the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// Internal row id (messages and events reference it)
    pub id: i64,
    /// Telegram user id, unique
    pub telegram_id: i64,
    /// Telegram username without '@', if the user has one
    pub username: Option<String>,
    /// Admins see the admin panel and can run the pipeline
    pub is_admin: bool,
    pub created_at: String,
    pub last_activity: String,
}

impl User {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            telegram_id: row.get(1)?,
            username: row.get(2)?,
            is_admin: row.get::<_, i64>(3)? != 0,
            created_at: row.get(4)?,
            last_activity: row.get(5)?,
        })
    }

    /// "@username" or the numeric id when there is no username
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => format!("@{}", name),
            None => self.telegram_id.to_string(),
        }
    }
}

const USER_COLUMNS: &str = "id, telegram_id, username, is_admin, created_at, last_activity";

/// Creates the user on first contact, otherwise refreshes username and last activity.
pub fn upsert_user(conn: &Connection, telegram_id: i64, username: Option<&str>) -> Result<User> {
    let username = username.map(|u| truncate_chars(u, USERNAME_MAX_LEN));
    conn.execute(
        "INSERT INTO users (telegram_id, username) VALUES (?1, ?2)
         ON CONFLICT(telegram_id) DO UPDATE SET
             username = COALESCE(excluded.username, users.username),
             last_activity = CURRENT_TIMESTAMP",
        params![telegram_id, username],
    )?;
    conn.query_row(
        &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
        params![telegram_id],
        User::from_row,
    )
}

/// Fetches a user by Telegram id.
pub fn get_user(conn: &Connection, telegram_id: i64) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
        params![telegram_id],
        User::from_row,
    )
    .optional()
}

/// Returns true if the user exists and has admin rights.
pub fn is_admin(conn: &Connection, telegram_id: i64) -> Result<bool> {
    Ok(get_user(conn, telegram_id)?.map(|u| u.is_admin).unwrap_or(false))
}

/// Grants or revokes admin rights. Returns false if the user is unknown.
pub fn set_admin(conn: &Connection, telegram_id: i64, admin: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET is_admin = ?2 WHERE telegram_id = ?1",
        params![telegram_id, i64::from(admin)],
    )?;
    Ok(changed > 0)
}

/// Makes sure every configured admin id exists and is flagged as admin.
pub fn ensure_admins(conn: &Connection, telegram_ids: &[i64]) -> Result<usize> {
    let mut promoted = 0;
    for &telegram_id in telegram_ids {
        conn.execute(
            "INSERT INTO users (telegram_id, is_admin) VALUES (?1, 1)
             ON CONFLICT(telegram_id) DO UPDATE SET is_admin = 1",
            params![telegram_id],
        )?;
        promoted += 1;
    }
    Ok(promoted)
}

/// All users, oldest first.
pub fn get_all_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
    let rows = stmt.query_map([], User::from_row)?;
    rows.collect()
}

/// Deletes a user; messages, events and requests cascade.
pub fn delete_user(conn: &Connection, telegram_id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM users WHERE telegram_id = ?1", params![telegram_id])? > 0)
}
