//! CSV export of the whole database, packed into a zip archive.

use std::io::{Cursor, Write};

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::error::AppResult;

/// Tables included in the export, in archive order
pub const EXPORT_TABLES: [&str; 4] = ["users", "messages", "events", "image_generation_requests"];

/// Escapes a single CSV field
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Dumps one table as CSV with a header row.
///
/// `table` must be one of [`EXPORT_TABLES`]; it is interpolated into SQL.
pub fn table_csv(conn: &Connection, table: &str) -> AppResult<String> {
    if !EXPORT_TABLES.contains(&table) {
        return Err(crate::AppError::Validation(format!("unknown table '{}'", table)));
    }

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY id", table))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut content = columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(",");
    content.push('\n');

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let fields = (0..columns.len())
            .map(|i| row.get_ref(i).map(|v| csv_field(&value_to_string(v))))
            .collect::<Result<Vec<_>, _>>()?;
        content.push_str(&fields.join(","));
        content.push('\n');
    }

    Ok(content)
}

/// Builds `export.zip` bytes with one CSV per table.
pub fn export_tables_zip(conn: &Connection) -> AppResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for table in EXPORT_TABLES {
        let csv = table_csv(conn, table)?;
        zip.start_file(format!("{}.csv", table), options)?;
        zip.write_all(csv.as_bytes())?;
    }

    let cursor = zip.finish()?;
    log::info!("📦 Database export built ({} tables)", EXPORT_TABLES.len());
    Ok(cursor.into_inner())
}

/// CSV with the users table only (attached to the admin users list).
pub fn users_csv(conn: &Connection) -> AppResult<String> {
    table_csv(conn, "users")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::activity::save_message;
    use crate::storage::db::test_support::temp_pool;
    use crate::storage::users::upsert_user;
    use std::io::Read;

    #[test]
    fn test_csv_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_users_csv_has_header_and_rows() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        upsert_user(&conn, 1, Some("anna")).unwrap();
        upsert_user(&conn, 2, None).unwrap();

        let csv = users_csv(&conn).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,telegram_id,username,is_admin"));
        assert!(lines[1].contains("anna"));
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        assert!(table_csv(&conn, "sqlite_master").is_err());
    }

    #[test]
    fn test_zip_contains_every_table() {
        let (_dir, pool) = temp_pool();
        let conn = pool.get().unwrap();
        let user = upsert_user(&conn, 3, Some("ben")).unwrap();
        save_message(&conn, user.id, "hello, \"world\"").unwrap();

        let bytes = export_tables_zip(&conn).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), EXPORT_TABLES.len());

        let mut messages = String::new();
        archive.by_name("messages.csv").unwrap().read_to_string(&mut messages).unwrap();
        assert!(messages.contains("\"hello, \"\"world\"\"\""));
    }
}
