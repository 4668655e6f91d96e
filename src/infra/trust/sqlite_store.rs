// SQLite-backed TrustStore.
//
// Tables:
// - trust_profiles: one row per user with the engagement counters

use crate::core::errors::ModerationError;
use crate::core::trust::{TrustLevel, TrustProfile, TrustStore};
use crate::infra::sqlite::{format_timestamp, parse_timestamp};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Pool, Row, Sqlite};
use std::time::Duration;

pub struct SqliteTrustStore {
    pool: Pool<Sqlite>,
}

impl SqliteTrustStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trust_profiles (
                user_id INTEGER PRIMARY KEY,
                level INTEGER NOT NULL DEFAULT 0,
                posts_read INTEGER NOT NULL DEFAULT 0,
                topics_viewed INTEGER NOT NULL DEFAULT 0,
                reading_time_secs INTEGER NOT NULL DEFAULT 0,
                posts_created INTEGER NOT NULL DEFAULT 0,
                topics_created INTEGER NOT NULL DEFAULT 0,
                likes_given INTEGER NOT NULL DEFAULT 0,
                likes_received INTEGER NOT NULL DEFAULT 0,
                days_visited INTEGER NOT NULL DEFAULT 0,
                last_visit_date TEXT,
                promoted_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl TrustStore for SqliteTrustStore {
    async fn get_profile(&self, user_id: u64) -> Result<Option<TrustProfile>, ModerationError> {
        let row = sqlx::query("SELECT * FROM trust_profiles WHERE user_id = ?")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        row.map(|row| row_to_profile(&row)).transpose()
    }

    async fn save_profile(&self, profile: &TrustProfile) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO trust_profiles (
                user_id, level, posts_read, topics_viewed, reading_time_secs,
                posts_created, topics_created, likes_given, likes_received,
                days_visited, last_visit_date, promoted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                level = excluded.level,
                posts_read = excluded.posts_read,
                topics_viewed = excluded.topics_viewed,
                reading_time_secs = excluded.reading_time_secs,
                posts_created = excluded.posts_created,
                topics_created = excluded.topics_created,
                likes_given = excluded.likes_given,
                likes_received = excluded.likes_received,
                days_visited = excluded.days_visited,
                last_visit_date = excluded.last_visit_date,
                promoted_at = excluded.promoted_at
            "#,
        )
        .bind(profile.user_id as i64)
        .bind(profile.level.as_u8() as i64)
        .bind(profile.posts_read as i64)
        .bind(profile.topics_viewed as i64)
        .bind(profile.reading_time.as_secs() as i64)
        .bind(profile.posts_created as i64)
        .bind(profile.topics_created as i64)
        .bind(profile.likes_given as i64)
        .bind(profile.likes_received as i64)
        .bind(profile.days_visited as i64)
        .bind(profile.last_visit_date.map(|d| d.to_string()))
        .bind(profile.promoted_at.map(format_timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| ModerationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<TrustProfile, ModerationError> {
    let level = row.get::<i64, _>("level");
    let last_visit: Option<String> = row.get("last_visit_date");
    let promoted_at: Option<String> = row.get("promoted_at");

    Ok(TrustProfile {
        user_id: row.get::<i64, _>("user_id") as u64,
        level: TrustLevel::from_u8(level as u8).ok_or_else(|| {
            ModerationError::StorageError(format!("Bad trust level {}", level))
        })?,
        posts_read: row.get::<i64, _>("posts_read") as u64,
        topics_viewed: row.get::<i64, _>("topics_viewed") as u64,
        reading_time: Duration::from_secs(row.get::<i64, _>("reading_time_secs") as u64),
        posts_created: row.get::<i64, _>("posts_created") as u64,
        topics_created: row.get::<i64, _>("topics_created") as u64,
        likes_given: row.get::<i64, _>("likes_given") as u64,
        likes_received: row.get::<i64, _>("likes_received") as u64,
        days_visited: row.get::<i64, _>("days_visited") as u64,
        last_visit_date: last_visit
            .map(|d| d.parse::<NaiveDate>().map_err(ModerationError::storage))
            .transpose()?,
        promoted_at: promoted_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trust::ActivityKind;
    use chrono::Utc;

    async fn store() -> (SqliteTrustStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.db");
        let pool = crate::infra::sqlite::connect(path.to_str().unwrap())
            .await
            .unwrap();
        let store = SqliteTrustStore::new(pool);
        store.migrate().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn profile_round_trips() {
        let (store, _dir) = store().await;
        assert!(store.get_profile(5).await.unwrap().is_none());

        let now = Utc::now();
        let mut profile = TrustProfile::new(5);
        profile.record(ActivityKind::PostRead, now);
        profile.record(ActivityKind::ReadingTime(Duration::from_secs(90)), now);
        profile.record(ActivityKind::DailyVisit, now);
        profile.promote(TrustLevel::Tl1, now);
        store.save_profile(&profile).await.unwrap();

        let loaded = store.get_profile(5).await.unwrap().unwrap();
        assert_eq!(loaded.level, TrustLevel::Tl1);
        assert_eq!(loaded.posts_read, 1);
        assert_eq!(loaded.reading_time, Duration::from_secs(90));
        assert_eq!(loaded.days_visited, 1);
        assert_eq!(loaded.last_visit_date, Some(now.date_naive()));
        assert!(loaded.promoted_at.is_some());
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let (store, _dir) = store().await;
        let mut profile = TrustProfile::new(9);
        store.save_profile(&profile).await.unwrap();
        profile.likes_received = 4;
        store.save_profile(&profile).await.unwrap();

        assert_eq!(store.get_profile(9).await.unwrap().unwrap().likes_received, 4);
    }
}
