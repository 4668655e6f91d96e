// SQLite-backed QueueStore.
//
// Tables:
// - review_queue_items: queue items; a partial unique index allows at most
//   one open (pending or escalated) item per (review_type, subject)
// - moderation_log: append-only audit trail, details stored as JSON text

use crate::core::content::Subject;
use crate::core::errors::ModerationError;
use crate::core::queue::{
    LogAction, ModerationLogEntry, NewReviewItem, Priority, QueueStats, QueueStore,
    ReviewQueueItem, ReviewStatus, ReviewType,
};
use crate::core::trust::TrustLevel;
use crate::infra::sqlite::{format_timestamp, parse_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

const OPEN_STATUSES: &str = "('pending', 'escalated')";

pub struct SqliteQueueStore {
    pool: Pool<Sqlite>,
}

impl SqliteQueueStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        // Queue items
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_queue_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                review_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                priority INTEGER NOT NULL,
                score REAL NOT NULL DEFAULT 0,
                subject_kind TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                author_id INTEGER,
                author_trust INTEGER,
                reporter INTEGER,
                assigned_moderator INTEGER,
                reason TEXT NOT NULL DEFAULT '',
                moderator_notes TEXT NOT NULL DEFAULT '',
                resolution_notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                resolved_at TEXT,
                upvotes INTEGER NOT NULL DEFAULT 0
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_open_subject
                ON review_queue_items(review_type, subject_kind, subject_id)
                WHERE status IN ('pending', 'escalated');
            CREATE INDEX IF NOT EXISTS idx_queue_status_score
                ON review_queue_items(status, score DESC, created_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        // Audit log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                moderator_id INTEGER,
                item_id INTEGER,
                subject_kind TEXT,
                subject_id INTEGER,
                reason TEXT NOT NULL DEFAULT '',
                details TEXT NOT NULL DEFAULT '{}',
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_log_item
                ON moderation_log(item_id, id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn find_open(
        &self,
        review_type: ReviewType,
        subject: Subject,
    ) -> Result<Option<ReviewQueueItem>, ModerationError> {
        let row = sqlx::query(&format!(
            "SELECT * FROM review_queue_items
             WHERE review_type = ? AND subject_kind = ? AND subject_id = ? AND status IN {}",
            OPEN_STATUSES
        ))
        .bind(review_type.as_str())
        .bind(subject.kind())
        .bind(subject.id() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        row.map(|row| row_to_item(&row)).transpose()
    }

    async fn insert_or_merge(
        &self,
        new: NewReviewItem,
    ) -> Result<(ReviewQueueItem, bool), ModerationError> {
        let mut tx = self.pool.begin().await.map_err(ModerationError::storage)?;

        // The partial unique index turns a second open insert into a no-op.
        let inserted = sqlx::query(
            r#"
            INSERT INTO review_queue_items (
                review_type, status, priority, score, subject_kind, subject_id,
                author_id, author_trust, reporter, reason, created_at
            )
            VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.review_type.as_str())
        .bind(new.priority.as_u8() as i64)
        .bind(new.score)
        .bind(new.subject.kind())
        .bind(new.subject.id() as i64)
        .bind(new.author_id.map(|id| id as i64))
        .bind(new.author_trust.map(|t| t.as_u8() as i64))
        .bind(new.reporter.map(|id| id as i64))
        .bind(&new.reason)
        .bind(format_timestamp(Utc::now()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(ModerationError::storage)?;

        let (row, created) = match inserted {
            Some(row) => (row, true),
            None => {
                let row = sqlx::query(&format!(
                    "UPDATE review_queue_items SET priority = MIN(priority, ?)
                     WHERE review_type = ? AND subject_kind = ? AND subject_id = ? AND status IN {}
                     RETURNING *",
                    OPEN_STATUSES
                ))
                .bind(new.priority.as_u8() as i64)
                .bind(new.review_type.as_str())
                .bind(new.subject.kind())
                .bind(new.subject.id() as i64)
                .fetch_optional(&mut *tx)
                .await
                .map_err(ModerationError::storage)?
                .ok_or_else(|| {
                    ModerationError::StorageError(format!(
                        "Insert for {} {} conflicted but no open item was found",
                        new.review_type, new.subject
                    ))
                })?;
                (row, false)
            }
        };

        let item = row_to_item(&row)?;
        tx.commit().await.map_err(ModerationError::storage)?;
        Ok((item, created))
    }

    async fn get(&self, item_id: u64) -> Result<Option<ReviewQueueItem>, ModerationError> {
        let row = sqlx::query("SELECT * FROM review_queue_items WHERE id = ?")
            .bind(item_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        row.map(|row| row_to_item(&row)).transpose()
    }

    async fn update(&self, item: &ReviewQueueItem) -> Result<(), ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE review_queue_items SET
                status = ?,
                priority = ?,
                score = ?,
                author_trust = ?,
                assigned_moderator = ?,
                reason = ?,
                moderator_notes = ?,
                resolution_notes = ?,
                resolved_at = ?,
                upvotes = ?
            WHERE id = ?
            "#,
        )
        .bind(item.status.as_str())
        .bind(item.priority.as_u8() as i64)
        .bind(item.score)
        .bind(item.author_trust.map(|t| t.as_u8() as i64))
        .bind(item.assigned_moderator.map(|id| id as i64))
        .bind(&item.reason)
        .bind(&item.moderator_notes)
        .bind(&item.resolution_notes)
        .bind(item.resolved_at.map(format_timestamp))
        .bind(item.upvotes as i64)
        .bind(item.id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::NotFound(format!("Queue item {}", item.id)));
        }
        Ok(())
    }

    async fn update_score(
        &self,
        item_id: u64,
        score: f64,
        author_trust: Option<TrustLevel>,
    ) -> Result<(), ModerationError> {
        let result =
            sqlx::query("UPDATE review_queue_items SET score = ?, author_trust = ? WHERE id = ?")
                .bind(score)
                .bind(author_trust.map(|t| t.as_u8() as i64))
                .bind(item_id as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::NotFound(format!("Queue item {}", item_id)));
        }
        Ok(())
    }

    async fn list_open(
        &self,
        filter: Option<ReviewType>,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<ReviewQueueItem>, u64), ModerationError> {
        let filter = filter.map(|t| t.as_str());

        let total: i64 = sqlx::query(&format!(
            "SELECT COUNT(*) FROM review_queue_items
             WHERE status IN {} AND (? IS NULL OR review_type = ?)",
            OPEN_STATUSES
        ))
        .bind(filter)
        .bind(filter)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?
        .get(0);

        let rows = sqlx::query(&format!(
            "SELECT * FROM review_queue_items
             WHERE status IN {} AND (? IS NULL OR review_type = ?)
             ORDER BY score DESC, created_at DESC, id DESC
             LIMIT ? OFFSET ?",
            OPEN_STATUSES
        ))
        .bind(filter)
        .bind(filter)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        let items = rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;
        Ok((items, total as u64))
    }

    async fn open_items(&self) -> Result<Vec<ReviewQueueItem>, ModerationError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM review_queue_items WHERE status IN {}
             ORDER BY score DESC, created_at DESC, id DESC",
            OPEN_STATUSES
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_item).collect()
    }

    async fn stats(&self) -> Result<QueueStats, ModerationError> {
        let mut stats = QueueStats::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM review_queue_items GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        for row in rows {
            let status: String = row.get("status");
            let count = row.get::<i64, _>("n") as u64;
            match ReviewStatus::parse(&status) {
                Some(ReviewStatus::Pending) => stats.pending_count = count,
                Some(ReviewStatus::Escalated) => stats.escalated_count = count,
                Some(ReviewStatus::NeedsInfo) => stats.needs_info_count = count,
                Some(ReviewStatus::Approved) => stats.approved_count = count,
                Some(ReviewStatus::Rejected) => stats.rejected_count = count,
                None => tracing::warn!(status = %status, "Unknown status in queue table"),
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT review_type, priority, COUNT(*) AS n FROM review_queue_items
             WHERE status IN {} GROUP BY review_type, priority",
            OPEN_STATUSES
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;
        for row in rows {
            let review_type: String = row.get("review_type");
            let priority = row.get::<i64, _>("priority") as u8;
            let count = row.get::<i64, _>("n") as u64;
            if let Some(review_type) = ReviewType::parse(&review_type) {
                *stats.counts_by_type.entry(review_type).or_default() += count;
            }
            *stats.counts_by_priority.entry(priority).or_default() += count;
        }

        let avg: Option<f64> = sqlx::query(
            r#"
            SELECT AVG((julianday(resolved_at) - julianday(created_at)) * 86400.0)
            FROM review_queue_items
            WHERE status IN ('approved', 'rejected') AND resolved_at IS NOT NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?
        .get(0);
        stats.avg_resolution_seconds = avg;

        Ok(stats)
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ModerationError> {
        let result = sqlx::query(
            r#"
            DELETE FROM review_queue_items
            WHERE status IN ('approved', 'rejected') AND resolved_at IS NOT NULL AND resolved_at < ?
            "#,
        )
        .bind(format_timestamp(cutoff))
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn append_log(&self, entry: ModerationLogEntry) -> Result<(), ModerationError> {
        let details = serde_json::to_string(&entry.details)
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO moderation_log (
                action, moderator_id, item_id, subject_kind, subject_id, reason, details, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.action.as_str())
        .bind(entry.moderator_id.map(|id| id as i64))
        .bind(entry.item_id.map(|id| id as i64))
        .bind(entry.subject.map(|s| s.kind()))
        .bind(entry.subject.map(|s| s.id() as i64))
        .bind(&entry.reason)
        .bind(details)
        .bind(format_timestamp(entry.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }

    async fn logs_for_item(
        &self,
        item_id: u64,
    ) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        let rows = sqlx::query("SELECT * FROM moderation_log WHERE item_id = ? ORDER BY id ASC")
            .bind(item_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_log_entry).collect()
    }
}

fn bad_column(column: &str, value: impl std::fmt::Display) -> ModerationError {
    ModerationError::StorageError(format!("Bad value for {}: {}", column, value))
}

fn row_to_subject(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Option<Subject>, ModerationError> {
    let kind: Option<String> = row.get("subject_kind");
    let id: Option<i64> = row.get("subject_id");
    match (kind, id) {
        (Some(kind), Some(id)) => Subject::from_parts(&kind, id as u64)
            .map(Some)
            .ok_or_else(|| bad_column("subject_kind", kind)),
        _ => Ok(None),
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<ReviewQueueItem, ModerationError> {
    let review_type: String = row.get("review_type");
    let status: String = row.get("status");
    let priority = row.get::<i64, _>("priority");
    let author_trust: Option<i64> = row.get("author_trust");
    let created_at: String = row.get("created_at");
    let resolved_at: Option<String> = row.get("resolved_at");

    Ok(ReviewQueueItem {
        id: row.get::<i64, _>("id") as u64,
        review_type: ReviewType::parse(&review_type)
            .ok_or_else(|| bad_column("review_type", &review_type))?,
        status: ReviewStatus::parse(&status).ok_or_else(|| bad_column("status", &status))?,
        priority: Priority::from_u8(priority as u8)
            .ok_or_else(|| bad_column("priority", priority))?,
        score: row.get("score"),
        subject: row_to_subject(row)?.ok_or_else(|| bad_column("subject", "missing"))?,
        author_id: row.get::<Option<i64>, _>("author_id").map(|id| id as u64),
        author_trust: author_trust
            .map(|t| TrustLevel::from_u8(t as u8).ok_or_else(|| bad_column("author_trust", t)))
            .transpose()?,
        reporter: row.get::<Option<i64>, _>("reporter").map(|id| id as u64),
        assigned_moderator: row
            .get::<Option<i64>, _>("assigned_moderator")
            .map(|id| id as u64),
        reason: row.get("reason"),
        moderator_notes: row.get("moderator_notes"),
        resolution_notes: row.get("resolution_notes"),
        created_at: parse_timestamp(&created_at)?,
        resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
        upvotes: row.get::<i64, _>("upvotes") as u32,
    })
}

fn row_to_log_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ModerationLogEntry, ModerationError> {
    let action: String = row.get("action");
    let details: String = row.get("details");
    let timestamp: String = row.get("timestamp");

    Ok(ModerationLogEntry {
        action: LogAction::parse(&action).ok_or_else(|| bad_column("action", &action))?,
        moderator_id: row.get::<Option<i64>, _>("moderator_id").map(|id| id as u64),
        item_id: row.get::<Option<i64>, _>("item_id").map(|id| id as u64),
        subject: row_to_subject(row)?,
        reason: row.get("reason"),
        details: serde_json::from_str(&details).map_err(|e| bad_column("details", e))?,
        timestamp: parse_timestamp(&timestamp)?,
    })
}
