// SQLite-backed ContentSource.
//
// Tables:
// - content_items: posts and topics mirrored from the forum

use crate::core::content::{ContentItem, ContentSource, RecentContentQuery, Subject};
use crate::core::errors::ModerationError;
use crate::infra::sqlite::{format_timestamp, parse_timestamp};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteContentStore {
    pool: Pool<Sqlite>,
}

impl SqliteContentStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                subject_kind TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                thread_id INTEGER NOT NULL,
                title TEXT,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (subject_kind, subject_id)
            );
            CREATE INDEX IF NOT EXISTS idx_content_author
                ON content_items(author_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_content_thread
                ON content_items(thread_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace (an edit) a post or topic.
    pub async fn save(&self, item: &ContentItem) -> Result<(), ModerationError> {
        if !item.subject.is_content() {
            return Err(ModerationError::ValidationFailure(format!(
                "{} is not a post or topic",
                item.subject
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO content_items (subject_kind, subject_id, author_id, thread_id, title, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subject_kind, subject_id) DO UPDATE SET
                author_id = excluded.author_id,
                thread_id = excluded.thread_id,
                title = excluded.title,
                body = excluded.body,
                created_at = excluded.created_at
            "#,
        )
        .bind(item.subject.kind())
        .bind(item.subject.id() as i64)
        .bind(item.author_id as i64)
        .bind(item.thread_id as i64)
        .bind(item.title.as_deref())
        .bind(&item.body)
        .bind(format_timestamp(item.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ContentSource for SqliteContentStore {
    async fn get_content(&self, subject: Subject) -> Result<Option<ContentItem>, ModerationError> {
        let row = sqlx::query("SELECT * FROM content_items WHERE subject_kind = ? AND subject_id = ?")
            .bind(subject.kind())
            .bind(subject.id() as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        row.map(|row| row_to_content(&row)).transpose()
    }

    async fn recent_content(
        &self,
        query: &RecentContentQuery,
    ) -> Result<Vec<ContentItem>, ModerationError> {
        let until = query.until.map(format_timestamp);
        let rows = sqlx::query(
            r#"
            SELECT * FROM content_items
            WHERE (author_id = ? OR thread_id = ?)
              AND created_at >= ?
              AND (? IS NULL OR created_at <= ?)
              AND (? IS NULL OR NOT (subject_kind = ? AND subject_id = ?))
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(query.author_id.map(|id| id as i64))
        .bind(query.thread_id.map(|id| id as i64))
        .bind(format_timestamp(query.since))
        .bind(until.as_deref())
        .bind(until.as_deref())
        .bind(query.exclude.map(|s| s.kind()))
        .bind(query.exclude.map(|s| s.kind()))
        .bind(query.exclude.map(|s| s.id() as i64))
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_content).collect()
    }
}

fn row_to_content(row: &sqlx::sqlite::SqliteRow) -> Result<ContentItem, ModerationError> {
    let kind: String = row.get("subject_kind");
    let id = row.get::<i64, _>("subject_id") as u64;
    let created_at: String = row.get("created_at");

    Ok(ContentItem {
        subject: Subject::from_parts(&kind, id).ok_or_else(|| {
            ModerationError::StorageError(format!("Unknown subject kind '{}'", kind))
        })?,
        author_id: row.get::<i64, _>("author_id") as u64,
        thread_id: row.get::<i64, _>("thread_id") as u64,
        title: row.get("title"),
        body: row.get("body"),
        created_at: parse_timestamp(&created_at)?,
    })
}
