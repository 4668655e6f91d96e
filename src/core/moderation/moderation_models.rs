// Moderation domain models - configuration and the events the engine emits.
//
// Events are returned to the caller; delivering them (notifications,
// websocket pushes, gamification points) is someone else's job.

use crate::core::content::Subject;
use crate::core::detection::DuplicateConfig;
use crate::core::queue::{Priority, ReviewQueueItem, ReviewStatus, ReviewType};
use crate::core::trust::TrustPromotion;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Something the caller may want to tell users about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModerationEvent {
    /// A new queue item was created (merges into existing items are silent).
    ItemQueued {
        item_id: u64,
        review_type: ReviewType,
        subject: Subject,
        priority: Priority,
    },
    /// An item was approved or rejected.
    ItemResolved {
        item_id: u64,
        subject: Subject,
        status: ReviewStatus,
        moderator_id: u64,
    },
    TrustPromoted(TrustPromotion),
}

impl ModerationEvent {
    /// Names the moderator who resolved the item, not whoever it was assigned to.
    pub fn resolved(item: &ReviewQueueItem, moderator_id: u64) -> Self {
        ModerationEvent::ItemResolved {
            item_id: item.id,
            subject: item.subject,
            status: item.status,
            moderator_id,
        }
    }
}

/// Tuning knobs for the moderation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// First segment of every cache key.
    pub cache_namespace: String,
    /// Spam score above this enqueues at priority 2.
    pub spam_high_threshold: f64,
    /// Spam score at or above this (and not high) enqueues at priority 3.
    pub spam_medium_threshold: f64,
    pub spam_score_ttl_secs: u64,
    pub duplicate_ttl_secs: u64,
    pub stats_ttl_secs: u64,
    /// Resolved items older than this are deleted by the cleanup sweep.
    pub retention_days: i64,
    /// Score changes larger than this get an audit entry during recalculation.
    pub significant_score_delta: f64,
    pub duplicate_window_days: i64,
    pub duplicate_max_candidates: usize,
    /// How far back the behavior check looks.
    pub behavior_window_hours: i64,
    pub behavior_max_items: usize,
    /// Suspicious items in the window that trigger a trust review.
    pub behavior_suspicious_count: usize,
    /// Items in the last hour by a TL0/TL1 user that trigger a trust review.
    pub behavior_burst_count: usize,
    pub cache_capacity: u64,
    pub database_url: String,
    pub cleanup_interval_secs: u64,
    pub recalculate_interval_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            cache_namespace: "modqueue".to_string(),
            spam_high_threshold: 0.7,
            spam_medium_threshold: 0.4,
            spam_score_ttl_secs: 5 * 60,  // 5 minutes
            duplicate_ttl_secs: 15 * 60,  // 15 minutes
            stats_ttl_secs: 60,           // 1 minute
            retention_days: 30,
            significant_score_delta: 10.0,
            duplicate_window_days: 7,
            duplicate_max_candidates: 100,
            behavior_window_hours: 24,
            behavior_max_items: 100,
            behavior_suspicious_count: 3,
            behavior_burst_count: 10,
            cache_capacity: 100_000,
            database_url: "data/moderation.db".to_string(),
            cleanup_interval_secs: 60 * 60,   // hourly
            recalculate_interval_secs: 5 * 60, // every 5 minutes
        }
    }
}

impl ModerationConfig {
    /// Defaults overridden by `MODQUEUE_*` environment variables.
    ///
    /// Call `dotenv::dotenv()` first to pick up a `.env` file. Values that
    /// don't parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |name: &str| lookup(&format!("MODQUEUE_{}", name));

        if let Some(namespace) = read("CACHE_NAMESPACE") {
            config.cache_namespace = namespace;
        }
        if let Some(url) = read("DATABASE_URL") {
            config.database_url = url;
        }
        override_parsed(&mut config.spam_high_threshold, "SPAM_HIGH_THRESHOLD", &read);
        override_parsed(&mut config.spam_medium_threshold, "SPAM_MEDIUM_THRESHOLD", &read);
        override_parsed(&mut config.spam_score_ttl_secs, "SPAM_SCORE_TTL_SECS", &read);
        override_parsed(&mut config.duplicate_ttl_secs, "DUPLICATE_TTL_SECS", &read);
        override_parsed(&mut config.stats_ttl_secs, "STATS_TTL_SECS", &read);
        override_parsed(&mut config.retention_days, "RETENTION_DAYS", &read);
        override_parsed(&mut config.significant_score_delta, "SIGNIFICANT_SCORE_DELTA", &read);
        override_parsed(&mut config.duplicate_window_days, "DUPLICATE_WINDOW_DAYS", &read);
        override_parsed(&mut config.duplicate_max_candidates, "DUPLICATE_MAX_CANDIDATES", &read);
        override_parsed(&mut config.behavior_window_hours, "BEHAVIOR_WINDOW_HOURS", &read);
        override_parsed(&mut config.behavior_max_items, "BEHAVIOR_MAX_ITEMS", &read);
        override_parsed(&mut config.behavior_suspicious_count, "BEHAVIOR_SUSPICIOUS_COUNT", &read);
        override_parsed(&mut config.behavior_burst_count, "BEHAVIOR_BURST_COUNT", &read);
        override_parsed(&mut config.cache_capacity, "CACHE_CAPACITY", &read);
        override_parsed(&mut config.cleanup_interval_secs, "CLEANUP_INTERVAL_SECS", &read);
        override_parsed(&mut config.recalculate_interval_secs, "RECALCULATE_INTERVAL_SECS", &read);

        config
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn recalculate_interval(&self) -> Duration {
        Duration::from_secs(self.recalculate_interval_secs)
    }

    pub fn spam_score_ttl(&self) -> Duration {
        Duration::from_secs(self.spam_score_ttl_secs)
    }

    pub fn duplicate_ttl(&self) -> Duration {
        Duration::from_secs(self.duplicate_ttl_secs)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    /// Settings for the `DuplicateDetector`.
    pub fn duplicate_config(&self) -> DuplicateConfig {
        DuplicateConfig {
            window: chrono::Duration::days(self.duplicate_window_days),
            max_candidates: self.duplicate_max_candidates,
            ..Default::default()
        }
    }

    /// Which priority a spam score maps to, if it warrants review at all.
    pub fn spam_priority(&self, score: f64) -> Option<Priority> {
        if score > self.spam_high_threshold {
            Some(Priority::High)
        } else if score >= self.spam_medium_threshold {
            Some(Priority::Medium)
        } else {
            None
        }
    }
}

fn override_parsed<T: FromStr>(field: &mut T, name: &str, read: &impl Fn(&str) -> Option<String>) {
    let Some(raw) = read(name) else { return };
    match raw.trim().parse() {
        Ok(value) => *field = value,
        Err(_) => tracing::warn!("Ignoring unparsable MODQUEUE_{}={:?}", name, raw),
    }
}

/// Outcome of the periodic score recalculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecalculationReport {
    pub examined: u64,
    /// Items whose score moved by more than the significant delta.
    pub significant: u64,
    pub failed: u64,
}
