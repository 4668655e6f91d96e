// In-memory ContentSource. The host forum pushes posts and topics in with
// `insert`; the engine only ever reads.

use crate::core::content::{ContentItem, ContentSource, RecentContentQuery, Subject};
use crate::core::errors::ModerationError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct InMemoryContentStore {
    items: DashMap<Subject, ContentItem>,
    /// Makes `recent_content` fail, to exercise degraded paths.
    fail_recent: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            fail_recent: AtomicBool::new(false),
        }
    }

    /// Insert or replace (an edit) a post or topic.
    pub fn insert(&self, item: ContentItem) {
        self.items.insert(item.subject, item);
    }

    pub fn get(&self, subject: Subject) -> Option<ContentItem> {
        self.items.get(&subject).map(|entry| entry.value().clone())
    }

    #[cfg(test)]
    pub fn fail_recent_queries(&self, fail: bool) {
        self.fail_recent.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for InMemoryContentStore {
    async fn get_content(&self, subject: Subject) -> Result<Option<ContentItem>, ModerationError> {
        Ok(self.get(subject))
    }

    async fn recent_content(
        &self,
        query: &RecentContentQuery,
    ) -> Result<Vec<ContentItem>, ModerationError> {
        if self.fail_recent.load(Ordering::SeqCst) {
            return Err(ModerationError::StorageError(
                "Content backend unavailable".to_string(),
            ));
        }

        let mut matches: Vec<ContentItem> = self
            .items
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        // Newest first
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches.truncate(query.limit);
        Ok(matches)
    }
}
