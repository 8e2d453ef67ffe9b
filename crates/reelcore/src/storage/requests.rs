//! Image generation requests made through the bot's image dialog.

use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle of a request; written once by the handler and read back for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Parameters for a new request
#[derive(Debug, Clone)]
pub struct NewImageRequest<'a> {
    /// Telegram id of the requesting user
    pub user_id: i64,
    pub prompt: &'a str,
    pub negative_prompt: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub n_iter: u32,
}

/// A stored request row
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub id: i64,
    pub user_id: i64,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub n_iter: u32,
    pub status: GenerationStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl ImageRequest {
    fn from_row(row: &Row<'_>) -> Result<Self> {
        let status: String = row.get(7)?;
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            prompt: row.get(2)?,
            negative_prompt: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            n_iter: row.get(6)?,
            status: status.parse().unwrap_or(GenerationStatus::Failed),
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

const REQUEST_COLUMNS: &str =
    "id, user_id, prompt, negative_prompt, width, height, n_iter, status, created_at, updated_at";

/// Inserts a pending request and returns its id.
pub fn create_request(conn: &Connection, request: &NewImageRequest<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO image_generation_requests (user_id, prompt, negative_prompt, width, height, n_iter)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            request.user_id,
            request.prompt,
            request.negative_prompt,
            request.width,
            request.height,
            request.n_iter
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_request_status(conn: &Connection, id: i64, status: GenerationStatus) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE image_generation_requests SET status = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![id, status.as_ref()],
    )?;
    Ok(changed > 0)
}

pub fn get_request(conn: &Connection, id: i64) -> Result<Option<ImageRequest>> {
    conn.query_row(
        &format!("SELECT {} FROM image_generation_requests WHERE id = ?1", REQUEST_COLUMNS),
        params![id],
        ImageRequest::from_row,
    )
    .optional()
}

/// Requests of one user, newest first.
pub fn list_requests(conn: &Connection, telegram_id: i64, limit: usize) -> Result<Vec<ImageRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM image_generation_requests WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        REQUEST_COLUMNS
    ))?;
    let rows = stmt.query_map(params![telegram_id, limit as i64], ImageRequest::from_row)?;
    rows.collect()
}
