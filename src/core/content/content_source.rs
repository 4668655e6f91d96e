use super::content_models::{ContentItem, Subject};
use crate::core::errors::ModerationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Bounded "recent content" lookup.
///
/// An item matches when its author equals `author_id` OR its thread equals
/// `thread_id` (a `None` side never matches). Results are newest first.
#[derive(Debug, Clone)]
pub struct RecentContentQuery {
    pub author_id: Option<u64>,
    pub thread_id: Option<u64>,
    /// Inclusive lower bound on `created_at`.
    pub since: DateTime<Utc>,
    /// Inclusive upper bound on `created_at`, if any.
    pub until: Option<DateTime<Utc>>,
    pub exclude: Option<Subject>,
    pub limit: usize,
}

impl RecentContentQuery {
    pub fn matches(&self, item: &ContentItem) -> bool {
        let related = self.author_id == Some(item.author_id)
            || self.thread_id == Some(item.thread_id);
        related
            && item.created_at >= self.since
            && self.until.map_or(true, |until| item.created_at <= until)
            && self.exclude != Some(item.subject)
    }
}

/// Read access to forum content (the "port" the forum implements).
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch one post or topic. `Ok(None)` if it doesn't exist.
    async fn get_content(&self, subject: Subject) -> Result<Option<ContentItem>, ModerationError>;

    /// Fetch at most `query.limit` matching items, newest first.
    async fn recent_content(
        &self,
        query: &RecentContentQuery,
    ) -> Result<Vec<ContentItem>, ModerationError>;
}
