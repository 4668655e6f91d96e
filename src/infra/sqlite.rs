// Shared SQLite connection setup for the sqlx-backed stores.

use crate::core::errors::ModerationError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Open (creating the file if needed) a pool for `database_url`.
///
/// Accepts `sqlite://path`, `sqlite::memory:` or a bare file path.
pub async fn connect(database_url: &str) -> anyhow::Result<Pool<Sqlite>> {
    let path_str = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
        if let Some(parent) = Path::new(path_str).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::File::create(path_str)?;
    }

    let conn_str = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    };

    // In-memory databases are per connection, so keep exactly one.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&conn_str)
        .await?;
    Ok(pool)
}

/// Fixed-width UTC form, so stored timestamps sort and compare as text.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ModerationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ModerationError::StorageError(format!("Bad timestamp '{}': {}", value, e)))
}
