// In-memory QueueStore.
//
// Items live in a DashMap keyed by id. A second map indexes the open item per
// (review_type, subject); its entry lock makes insert-or-merge atomic and
// rejects a second open item the same way the partial unique index does for
// SQLite. Entries leave the index when their item closes.

use crate::core::content::Subject;
use crate::core::errors::ModerationError;
use crate::core::queue::{
    ModerationLogEntry, NewReviewItem, QueueStats, QueueStore, ReviewQueueItem, ReviewStatus,
    ReviewType,
};
use crate::core::trust::TrustLevel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub struct InMemoryQueueStore {
    items: DashMap<u64, ReviewQueueItem>,
    open_index: DashMap<(ReviewType, Subject), u64>,
    next_id: AtomicU64,
    /// Append-only, in insertion order.
    logs: RwLock<Vec<ModerationLogEntry>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            open_index: DashMap::new(),
            next_id: AtomicU64::new(1),
            logs: RwLock::new(Vec::new()),
        }
    }

    /// The open item `id` points at, if it still exists and is still open.
    fn open_item(&self, id: u64) -> Option<ReviewQueueItem> {
        self.items
            .get(&id)
            .filter(|item| item.status.is_open())
            .map(|item| item.value().clone())
    }

    fn replace(&self, item: &ReviewQueueItem) -> Result<(), ModerationError> {
        match self.items.get_mut(&item.id) {
            Some(mut stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(ModerationError::NotFound(format!("Queue item {}", item.id))),
        }
    }

    fn open_sorted(&self, filter: Option<ReviewType>) -> Vec<ReviewQueueItem> {
        let mut open: Vec<ReviewQueueItem> = self
            .items
            .iter()
            .filter(|entry| entry.status.is_open())
            .filter(|entry| filter.map_or(true, |t| entry.review_type == t))
            .map(|entry| entry.value().clone())
            .collect();

        open.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        open
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn find_open(
        &self,
        review_type: ReviewType,
        subject: Subject,
    ) -> Result<Option<ReviewQueueItem>, ModerationError> {
        let id = self.open_index.get(&(review_type, subject)).map(|e| *e.value());
        Ok(id.and_then(|id| self.open_item(id)))
    }

    async fn insert_or_merge(
        &self,
        new: NewReviewItem,
    ) -> Result<(ReviewQueueItem, bool), ModerationError> {
        let entry = self.open_index.entry((new.review_type, new.subject));

        if let Entry::Occupied(ref occupied) = entry {
            let id = *occupied.get();
            if let Some(mut existing) = self.items.get_mut(&id) {
                if existing.status.is_open() {
                    if new.priority < existing.priority {
                        existing.priority = new.priority;
                    }
                    return Ok((existing.value().clone(), false));
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let item = ReviewQueueItem::from_new(id, new, Utc::now());
        self.items.insert(id, item.clone());
        entry.insert(id);
        Ok((item, true))
    }

    async fn get(&self, item_id: u64) -> Result<Option<ReviewQueueItem>, ModerationError> {
        Ok(self.items.get(&item_id).map(|item| item.value().clone()))
    }

    async fn update(&self, item: &ReviewQueueItem) -> Result<(), ModerationError> {
        let key = (item.review_type, item.subject);
        if !item.status.is_open() {
            self.replace(item)?;
            self.open_index.remove_if(&key, |_, id| *id == item.id);
            return Ok(());
        }

        let entry = self.open_index.entry(key);
        if let Entry::Occupied(ref occupied) = entry {
            let current = *occupied.get();
            if current != item.id && self.open_item(current).is_some() {
                return Err(ModerationError::StorageError(format!(
                    "Queue item {} is already open for {} {}",
                    current, item.review_type, item.subject
                )));
            }
        }
        self.replace(item)?;
        entry.insert(item.id);
        Ok(())
    }

    async fn update_score(
        &self,
        item_id: u64,
        score: f64,
        author_trust: Option<TrustLevel>,
    ) -> Result<(), ModerationError> {
        match self.items.get_mut(&item_id) {
            Some(mut stored) => {
                stored.score = score;
                stored.author_trust = author_trust;
                Ok(())
            }
            None => Err(ModerationError::NotFound(format!("Queue item {}", item_id))),
        }
    }

    async fn list_open(
        &self,
        filter: Option<ReviewType>,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<ReviewQueueItem>, u64), ModerationError> {
        let open = self.open_sorted(filter);
        let total = open.len() as u64;
        let page = open
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn open_items(&self) -> Result<Vec<ReviewQueueItem>, ModerationError> {
        Ok(self.open_sorted(None))
    }

    async fn stats(&self) -> Result<QueueStats, ModerationError> {
        let mut stats = QueueStats::default();
        let mut resolution_total = 0.0;
        let mut resolved = 0u64;

        for entry in self.items.iter() {
            let item = entry.value();
            match item.status {
                ReviewStatus::Pending => stats.pending_count += 1,
                ReviewStatus::Escalated => stats.escalated_count += 1,
                ReviewStatus::NeedsInfo => stats.needs_info_count += 1,
                ReviewStatus::Approved => stats.approved_count += 1,
                ReviewStatus::Rejected => stats.rejected_count += 1,
            }
            if item.status.is_open() {
                *stats.counts_by_type.entry(item.review_type).or_default() += 1;
                *stats
                    .counts_by_priority
                    .entry(item.priority.as_u8())
                    .or_default() += 1;
            }
            if let (true, Some(resolved_at)) = (item.status.is_terminal(), item.resolved_at) {
                resolution_total +=
                    (resolved_at - item.created_at).num_milliseconds() as f64 / 1000.0;
                resolved += 1;
            }
        }

        if resolved > 0 {
            stats.avg_resolution_seconds = Some(resolution_total / resolved as f64);
        }
        Ok(stats)
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ModerationError> {
        let before = self.items.len();
        self.items.retain(|_, item| {
            !(item.status.is_terminal() && item.resolved_at.map_or(false, |at| at < cutoff))
        });
        self.open_index.retain(|_, id| self.items.contains_key(id));
        Ok((before - self.items.len()) as u64)
    }

    async fn append_log(&self, entry: ModerationLogEntry) -> Result<(), ModerationError> {
        self.logs.write().await.push(entry);
        Ok(())
    }

    async fn logs_for_item(
        &self,
        item_id: u64,
    ) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|entry| entry.item_id == Some(item_id))
            .cloned()
            .collect())
    }
}
