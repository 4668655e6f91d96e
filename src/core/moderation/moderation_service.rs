// Moderation service - the engine's boundary.
//
// This service handles:
// - New/edited content triggers (trust gate, spam score, duplicate search)
// - User behavior checks (promotion, suspicious bursts)
// - Moderator actions on queue items
// - Cached detection results and their invalidation
// - Periodic cleanup and score recalculation
//
// Detection and cache failures never fail a trigger: they are logged and
// treated as "no signal".

use super::moderation_cache::{CacheKey, CachedValue, DetectionCache};
use super::moderation_models::{ModerationConfig, ModerationEvent, RecalculationReport};
use crate::core::content::{ContentItem, ContentSource, RecentContentQuery, Subject};
use crate::core::detection::{DuplicateDetector, SpamScorer};
use crate::core::errors::ModerationError;
use crate::core::queue::{
    EnqueueOutcome, EnqueueRequest, LogAction, ModerationLogEntry, Priority, QueuePage,
    QueueStats, QueueStore, ResolveAction, ReviewQueue, ReviewQueueItem, ReviewType,
};
use crate::core::trust::{TrustLevel, TrustLevelTracker, TrustStore};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

pub struct ModerationService<Q: QueueStore, T: TrustStore, C: ContentSource> {
    queue: ReviewQueue<Q>,
    trust: TrustLevelTracker<T>,
    spam: SpamScorer,
    duplicates: DuplicateDetector<C>,
    content: Arc<C>,
    cache: Arc<dyn DetectionCache>,
    config: ModerationConfig,
}

impl<Q: QueueStore, T: TrustStore, C: ContentSource> ModerationService<Q, T, C> {
    /// Wire the engine together. Every collaborator is passed in; nothing is
    /// looked up from global state.
    pub fn new(
        queue: ReviewQueue<Q>,
        trust: TrustLevelTracker<T>,
        spam: SpamScorer,
        duplicates: DuplicateDetector<C>,
        content: Arc<C>,
        cache: Arc<dyn DetectionCache>,
        config: ModerationConfig,
    ) -> Self {
        Self {
            queue,
            trust,
            spam,
            duplicates,
            content,
            cache,
            config,
        }
    }

    pub fn queue(&self) -> &ReviewQueue<Q> {
        &self.queue
    }

    pub fn trust(&self) -> &TrustLevelTracker<T> {
        &self.trust
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------------

    /// Run every check a freshly created post or topic goes through.
    pub async fn check_new_content(
        &self,
        subject: Subject,
    ) -> Result<Vec<ModerationEvent>, ModerationError> {
        let content = self.load_content(subject).await?;
        let level = self.trust.level(content.author_id).await?;
        let mut events = Vec::new();

        if level == TrustLevel::Tl0 {
            self.enqueue(
                EnqueueRequest::new(ReviewType::NewUserPost, subject, Priority::Medium)
                    .author(content.author_id, Some(level))
                    .reason("Content from a new user (TL0)"),
                &mut events,
            )
            .await?;
        }

        let spam_score = self.cached_spam_score(&content);
        if let Some(priority) = self.config.spam_priority(spam_score) {
            self.enqueue(
                EnqueueRequest::new(ReviewType::SpamDetection, subject, priority)
                    .author(content.author_id, Some(level))
                    .reason(format!("Spam score {:.2}", spam_score)),
                &mut events,
            )
            .await?;
        }

        if self.cached_duplicate(&content).await {
            self.enqueue(
                EnqueueRequest::new(ReviewType::EditedPost, subject, Priority::Low)
                    .author(content.author_id, Some(level))
                    .reason("Possible duplicate of recent content"),
                &mut events,
            )
            .await?;
        }

        tracing::debug!(
            subject = %subject,
            author_id = content.author_id,
            trust_level = %level,
            spam_score,
            queued = events.len(),
            "Checked new content"
        );
        Ok(events)
    }

    /// Re-check content after an edit.
    ///
    /// Cached results for the subject are dropped first. The fresh spam score
    /// is not written back, so the next cached lookup misses and recomputes.
    pub async fn check_edited_content(
        &self,
        subject: Subject,
        editor_id: u64,
    ) -> Result<Vec<ModerationEvent>, ModerationError> {
        self.invalidate_content(subject);

        let content = self.load_content(subject).await?;
        let level = self.trust.level(content.author_id).await?;
        let mut events = Vec::new();

        let spam_score = self.spam.score_content(&content);
        if let Some(priority) = self.config.spam_priority(spam_score) {
            self.enqueue(
                EnqueueRequest::new(ReviewType::SpamDetection, subject, priority)
                    .author(content.author_id, Some(level))
                    .reason(format!(
                        "Spam score {:.2} after edit by user {}",
                        spam_score, editor_id
                    )),
                &mut events,
            )
            .await?;
        }

        if level <= TrustLevel::Tl1 {
            self.enqueue(
                EnqueueRequest::new(ReviewType::EditedPost, subject, Priority::Medium)
                    .author(content.author_id, Some(level))
                    .reason(format!("Edited by user {} (author is {})", editor_id, level)),
                &mut events,
            )
            .await?;
        }

        Ok(events)
    }

    /// Look at a user as a whole: promote if due, and queue a trust review
    /// when their recent content looks like spam or arrives in a burst.
    pub async fn check_user_behavior(
        &self,
        user_id: u64,
    ) -> Result<Vec<ModerationEvent>, ModerationError> {
        let mut events = Vec::new();

        if let Some(promotion) = self.trust.evaluate(user_id).await? {
            self.queue
                .record(ModerationLogEntry::system(
                    LogAction::TrustPromoted,
                    Some(Subject::User(user_id)),
                    format!("Promoted to {}", promotion.new_level),
                    json!({
                        "from": promotion.old_level.as_u8(),
                        "to": promotion.new_level.as_u8(),
                    }),
                ))
                .await?;
            events.push(ModerationEvent::TrustPromoted(promotion));
        }

        let level = self.trust.level(user_id).await?;
        let now = Utc::now();
        let query = RecentContentQuery {
            author_id: Some(user_id),
            thread_id: None,
            since: now - Duration::hours(self.config.behavior_window_hours),
            until: None,
            exclude: None,
            limit: self.config.behavior_max_items,
        };
        let recent = match self.content.recent_content(&query).await {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!(user_id, "Behavior check skipped, content lookup failed: {}", e);
                return Ok(events);
            }
        };

        let suspicious = recent
            .iter()
            .filter(|c| self.cached_spam_score(c) >= self.config.spam_medium_threshold)
            .count();
        let last_hour = recent
            .iter()
            .filter(|c| c.created_at >= now - Duration::hours(1))
            .count();

        let trigger = if suspicious >= self.config.behavior_suspicious_count {
            Some((
                Priority::High,
                format!(
                    "{} suspicious items in the last {}h",
                    suspicious, self.config.behavior_window_hours
                ),
            ))
        } else if level <= TrustLevel::Tl1 && last_hour >= self.config.behavior_burst_count {
            Some((
                Priority::Medium,
                format!("{} items in the last hour from a {} user", last_hour, level),
            ))
        } else {
            None
        };

        if let Some((priority, reason)) = trigger {
            self.enqueue(
                EnqueueRequest::new(ReviewType::TrustLevelReview, Subject::User(user_id), priority)
                    .author(user_id, Some(level))
                    .reason(reason),
                &mut events,
            )
            .await?;
        }

        Ok(events)
    }

    /// A user or moderator flags a post, topic or user.
    pub async fn flag_content(
        &self,
        subject: Subject,
        reporter_id: u64,
        reason: &str,
        priority: Priority,
    ) -> Result<EnqueueOutcome, ModerationError> {
        let (review_type, author_id) = match subject {
            Subject::User(id) => (ReviewType::UserReport, id),
            _ => (
                ReviewType::FlaggedPost,
                self.load_content(subject).await?.author_id,
            ),
        };
        let level = self.trust.level(author_id).await?;

        let outcome = self
            .queue
            .enqueue(
                EnqueueRequest::new(review_type, subject, priority)
                    .author(author_id, Some(level))
                    .reporter(reporter_id)
                    .reason(reason),
            )
            .await?;
        self.invalidate_stats();
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Moderator actions
    // ------------------------------------------------------------------------

    /// Approve or reject an item, then drop cached results for its content.
    pub async fn resolve(
        &self,
        item_id: u64,
        moderator_id: u64,
        action: ResolveAction,
        notes: Option<&str>,
    ) -> Result<(ReviewQueueItem, ModerationEvent), ModerationError> {
        let item = self
            .queue
            .resolve(item_id, moderator_id, action, notes)
            .await?;
        if item.subject.is_content() {
            self.invalidate_content(item.subject);
        }
        self.invalidate_stats();
        let event = ModerationEvent::resolved(&item, moderator_id);
        Ok((item, event))
    }

    pub async fn escalate(
        &self,
        item_id: u64,
        moderator_id: u64,
        notes: Option<&str>,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let item = self.queue.escalate(item_id, moderator_id, notes).await?;
        self.invalidate_stats();
        Ok(item)
    }

    pub async fn request_info(
        &self,
        item_id: u64,
        moderator_id: u64,
        notes: Option<&str>,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let item = self.queue.request_info(item_id, moderator_id, notes).await?;
        self.invalidate_stats();
        Ok(item)
    }

    pub async fn reopen(
        &self,
        item_id: u64,
        moderator_id: u64,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let item = self.queue.reopen(item_id, moderator_id).await?;
        self.invalidate_stats();
        Ok(item)
    }

    pub async fn assign(
        &self,
        item_id: u64,
        moderator_id: u64,
    ) -> Result<ReviewQueueItem, ModerationError> {
        self.queue.assign(item_id, moderator_id).await
    }

    pub async fn upvote(&self, item_id: u64) -> Result<ReviewQueueItem, ModerationError> {
        self.queue.upvote(item_id).await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Open items ordered by `(score desc, created_at desc)`.
    pub async fn list_pending(
        &self,
        filter: Option<ReviewType>,
        page: u32,
        page_size: u32,
    ) -> Result<QueuePage, ModerationError> {
        self.queue.list_pending(filter, page, page_size).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, ModerationError> {
        let key = CacheKey::queue_stats(&self.config.cache_namespace);
        if let Some(CachedValue::Stats(stats)) = self.cache_get(&key) {
            return Ok(stats);
        }

        let stats = self.queue.stats().await?;
        self.cache_put(&key, CachedValue::Stats(stats.clone()), self.config.stats_ttl());
        Ok(stats)
    }

    pub async fn item_history(
        &self,
        item_id: u64,
    ) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        self.queue.history(item_id).await
    }

    // ------------------------------------------------------------------------
    // Maintenance sweeps
    // ------------------------------------------------------------------------

    /// Delete resolved items older than the retention window.
    pub async fn cleanup_resolved(&self) -> Result<u64, ModerationError> {
        let deleted = self.queue.cleanup_resolved(self.config.retention()).await?;
        if deleted > 0 {
            self.invalidate_stats();
        }
        Ok(deleted)
    }

    /// Re-derive every open item's score with fresh trust levels.
    ///
    /// Per-item failures are logged and counted; the sweep carries on.
    pub async fn recalculate_priorities(&self) -> Result<RecalculationReport, ModerationError> {
        let mut report = RecalculationReport::default();

        for item in self.queue.open_items().await? {
            let trust = match item.author_id {
                Some(author_id) => match self.trust.level(author_id).await {
                    Ok(level) => Some(level),
                    Err(e) => {
                        tracing::warn!(item_id = item.id, "Trust lookup failed: {}", e);
                        None
                    }
                },
                None => None,
            };

            match self
                .queue
                .recalculate(item.id, trust, self.config.significant_score_delta)
                .await
            {
                Ok(Some((old, new))) => {
                    report.examined += 1;
                    if (new - old).abs() > self.config.significant_score_delta {
                        report.significant += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(item_id = item.id, "Score recalculation failed: {}", e);
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            significant = report.significant,
            failed = report.failed,
            "Priority recalculation finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Cached detection
    // ------------------------------------------------------------------------

    pub fn spam_key(&self, subject: Subject) -> CacheKey {
        CacheKey::spam_score(&self.config.cache_namespace, self.spam.rule_version(), subject)
    }

    pub fn duplicate_key(&self, subject: Subject) -> CacheKey {
        CacheKey::duplicate_flag(
            &self.config.cache_namespace,
            self.duplicates.rule_version(),
            subject,
        )
    }

    /// Spam score for `content`, from cache when possible.
    pub fn cached_spam_score(&self, content: &ContentItem) -> f64 {
        let key = self.spam_key(content.subject);
        if let Some(CachedValue::Score(score)) = self.cache_get(&key) {
            return score;
        }

        let score = self.spam.score_content(content);
        self.cache_put(&key, CachedValue::Score(score), self.config.spam_score_ttl());
        score
    }

    /// Duplicate flag for `content`, from cache when possible. Detector
    /// failures count as "not a duplicate" and are not cached.
    pub async fn cached_duplicate(&self, content: &ContentItem) -> bool {
        let key = self.duplicate_key(content.subject);
        if let Some(CachedValue::Flag(flag)) = self.cache_get(&key) {
            return flag;
        }

        match self.duplicates.is_duplicate(content).await {
            Ok(flag) => {
                self.cache_put(&key, CachedValue::Flag(flag), self.config.duplicate_ttl());
                flag
            }
            Err(e) => {
                tracing::warn!(subject = %content.subject, "Duplicate check failed: {}", e);
                false
            }
        }
    }

    /// Drop cached detection results for one post or topic.
    pub fn invalidate_content(&self, subject: Subject) {
        self.cache_invalidate(&self.spam_key(subject));
        self.cache_invalidate(&self.duplicate_key(subject));
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn load_content(&self, subject: Subject) -> Result<ContentItem, ModerationError> {
        if !subject.is_content() {
            return Err(ModerationError::ValidationFailure(format!(
                "{} is not a post or topic",
                subject
            )));
        }
        self.content
            .get_content(subject)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Content {}", subject)))
    }

    async fn enqueue(
        &self,
        request: EnqueueRequest,
        events: &mut Vec<ModerationEvent>,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let outcome = self.queue.enqueue(request).await?;
        if outcome.created {
            events.push(ModerationEvent::ItemQueued {
                item_id: outcome.item.id,
                review_type: outcome.item.review_type,
                subject: outcome.item.subject,
                priority: outcome.item.priority,
            });
        }
        self.invalidate_stats();
        Ok(outcome.item)
    }

    fn invalidate_stats(&self) {
        self.cache_invalidate(&CacheKey::queue_stats(&self.config.cache_namespace));
    }

    fn cache_get(&self, key: &CacheKey) -> Option<CachedValue> {
        match self.cache.get(key) {
            Ok(hit) => {
                tracing::debug!(key = %key, hit = hit.is_some(), "Cache lookup");
                hit
            }
            Err(e) => {
                tracing::warn!(key = %key, "Cache read failed, recomputing: {}", e);
                None
            }
        }
    }

    fn cache_put(&self, key: &CacheKey, value: CachedValue, ttl: std::time::Duration) {
        if let Err(e) = self.cache.put(key, value, ttl) {
            tracing::warn!(key = %key, "Cache write failed: {}", e);
        }
    }

    fn cache_invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.cache.invalidate(key) {
            tracing::warn!(key = %key, "Cache invalidation failed: {}", e);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::SpamRules;
    use crate::core::moderation::CacheError;
    use crate::core::queue::ReviewStatus;
    use crate::core::trust::ActivityKind;
    use crate::infra::cache::MokaDetectionCache;
    use crate::infra::content::InMemoryContentStore;
    use crate::infra::queue::InMemoryQueueStore;
    use crate::infra::trust::InMemoryTrustStore;

    type TestService =
        ModerationService<InMemoryQueueStore, InMemoryTrustStore, InMemoryContentStore>;

    /// Cache whose backend is always down.
    struct BrokenCache;

    impl DetectionCache for BrokenCache {
        fn get(&self, _: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        fn put(
            &self,
            _: &CacheKey,
            _: CachedValue,
            _: std::time::Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        fn invalidate(&self, _: &CacheKey) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    struct Harness {
        service: TestService,
        content: Arc<InMemoryContentStore>,
        cache: Arc<MokaDetectionCache>,
    }

    fn harness() -> Harness {
        let content = Arc::new(InMemoryContentStore::new());
        let cache = Arc::new(MokaDetectionCache::new(10_000));
        let service = build(Arc::clone(&content), cache.clone());
        Harness {
            service,
            content,
            cache,
        }
    }

    fn build(content: Arc<InMemoryContentStore>, cache: Arc<dyn DetectionCache>) -> TestService {
        let config = ModerationConfig::default();
        ModerationService::new(
            ReviewQueue::new(InMemoryQueueStore::new()),
            TrustLevelTracker::new(InMemoryTrustStore::new()),
            SpamScorer::new(),
            DuplicateDetector::with_config(Arc::clone(&content), config.duplicate_config()),
            content,
            cache,
            config,
        )
    }

    const CLEAN: &str = "Has anyone worked through the lifetimes chapter? The elision rules confuse me.";
    const EIGHTY_CHARS: &str =
        "This exact paragraph is exactly eighty characters long, give or take a few ones.";

    async fn make_tl2(service: &TestService, user_id: u64) {
        service.trust().set_level(user_id, TrustLevel::Tl2).await.unwrap();
    }

    fn types(page: &QueuePage) -> Vec<ReviewType> {
        let mut types: Vec<ReviewType> = page.items.iter().map(|i| i.review_type).collect();
        types.sort();
        types
    }

    #[tokio::test]
    async fn scenario_new_user_spam_creates_two_items() {
        let h = harness();
        h.content.insert(ContentItem::post(
            1,
            10,
            100,
            "Buy cheap viagra pills now!!! Click here!",
        ));

        let events = h.service.check_new_content(Subject::Post(1)).await.unwrap();
        assert_eq!(events.len(), 2);

        let page = h.service.list_pending(None, 1, 20).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(
            types(&page),
            vec![ReviewType::NewUserPost, ReviewType::SpamDetection]
        );
        let spam = page
            .items
            .iter()
            .find(|i| i.review_type == ReviewType::SpamDetection)
            .unwrap();
        assert_eq!(spam.priority, Priority::High);
        let new_user = page
            .items
            .iter()
            .find(|i| i.review_type == ReviewType::NewUserPost)
            .unwrap();
        assert_eq!(new_user.priority, Priority::Medium);
        // Spam outranks the new-user review.
        assert_eq!(page.items[0].id, spam.id);
    }

    #[tokio::test]
    async fn repeated_trigger_does_not_flood_queue() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, "Click here!!! bit.ly/xyz"));

        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let events = h.service.check_new_content(Subject::Post(1)).await.unwrap();
        assert!(events.is_empty());

        let page = h.service.list_pending(None, 1, 20).await.unwrap();
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test]
    async fn trusted_clean_post_is_not_queued() {
        let h = harness();
        make_tl2(&h.service, 10).await;
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));

        let events = h.service.check_new_content(Subject::Post(1)).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(h.service.queue_stats().await.unwrap().pending_count, 0);
    }

    #[tokio::test]
    async fn scenario_duplicate_post_queued_at_low_priority() {
        let h = harness();
        make_tl2(&h.service, 10).await;
        let now = Utc::now();
        h.content.insert(
            ContentItem::post(1, 10, 100, EIGHTY_CHARS).created_at(now - Duration::hours(3)),
        );
        h.content
            .insert(ContentItem::post(2, 10, 200, EIGHTY_CHARS).created_at(now));

        assert!(h.service.check_new_content(Subject::Post(1)).await.unwrap().is_empty());
        let events = h.service.check_new_content(Subject::Post(2)).await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ModerationEvent::ItemQueued {
                review_type,
                subject,
                priority,
                ..
            } => {
                assert_eq!(*review_type, ReviewType::EditedPost);
                assert_eq!(*subject, Subject::Post(2));
                assert_eq!(*priority, Priority::Low);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let h = harness();
        let result = h.service.check_new_content(Subject::Post(404)).await;
        assert!(matches!(result, Err(ModerationError::NotFound(_))));

        let result = h.service.check_new_content(Subject::User(1)).await;
        assert!(matches!(result, Err(ModerationError::ValidationFailure(_))));
    }

    #[tokio::test]
    async fn detection_results_are_cached_with_versioned_keys() {
        let h = harness();
        make_tl2(&h.service, 10).await;
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();

        let spam_key = h.service.spam_key(Subject::Post(1));
        assert_eq!(spam_key.to_string(), "modqueue:spam:v1:post:1");
        assert_eq!(h.cache.get(&spam_key).unwrap(), Some(CachedValue::Score(0.0)));
        assert_eq!(
            h.cache.get(&h.service.duplicate_key(Subject::Post(1))).unwrap(),
            Some(CachedValue::Flag(false))
        );
    }

    #[tokio::test]
    async fn rule_version_bump_misses_old_entries() {
        let h = harness();
        make_tl2(&h.service, 10).await;
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();

        let config = ModerationConfig::default();
        let rules = SpamRules::compile(2, &[r"\blifetimes\b"], &[]).unwrap();
        let bumped: TestService = ModerationService::new(
            ReviewQueue::new(InMemoryQueueStore::new()),
            TrustLevelTracker::new(InMemoryTrustStore::new()),
            SpamScorer::with_rules(rules),
            DuplicateDetector::with_config(Arc::clone(&h.content), config.duplicate_config()),
            Arc::clone(&h.content),
            h.cache.clone(),
            config,
        );

        let content = h.content.get(Subject::Post(1)).unwrap();
        assert_eq!(
            bumped.spam_key(Subject::Post(1)).to_string(),
            "modqueue:spam:v2:post:1"
        );
        // The v1 score is never read back under the new rules.
        assert!((bumped.cached_spam_score(&content) - 0.5).abs() < 1e-9);
        assert_eq!(h.service.cached_spam_score(&content), 0.0);
    }

    #[tokio::test]
    async fn edit_invalidates_cached_detection() {
        let h = harness();
        make_tl2(&h.service, 10).await;
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();

        let spam_key = h.service.spam_key(Subject::Post(1));
        let dup_key = h.service.duplicate_key(Subject::Post(1));
        assert!(h.cache.get(&spam_key).unwrap().is_some());

        // Edit turns it into spam.
        h.content.insert(ContentItem::post(
            1,
            10,
            100,
            "Edited: buy cheap viagra here, click here, online casino with free spins!",
        ));
        let events = h.service.check_edited_content(Subject::Post(1), 10).await.unwrap();

        assert!(h.cache.get(&spam_key).unwrap().is_none());
        assert!(h.cache.get(&dup_key).unwrap().is_none());
        assert_eq!(events.len(), 1, "TL2 author: spam review only, no edit review");

        // Next cached lookup recomputes from the edited text.
        let content = h.content.get(Subject::Post(1)).unwrap();
        let score = h.service.cached_spam_score(&content);
        assert!(score > 0.7);
        assert_eq!(h.cache.get(&spam_key).unwrap(), Some(CachedValue::Score(score)));
    }

    #[tokio::test]
    async fn low_trust_edit_is_reviewed() {
        let h = harness();
        h.service.trust().set_level(10, TrustLevel::Tl1).await.unwrap();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));

        let events = h.service.check_edited_content(Subject::Post(1), 10).await.unwrap();
        assert_eq!(events.len(), 1);
        let page = h.service.list_pending(Some(ReviewType::EditedPost), 1, 10).await.unwrap();
        assert_eq!(page.items[0].priority, Priority::Medium);
    }

    #[tokio::test]
    async fn cache_outage_degrades_to_recomputation() {
        let content = Arc::new(InMemoryContentStore::new());
        let service = build(Arc::clone(&content), Arc::new(BrokenCache));
        content.insert(ContentItem::post(1, 10, 100, "Buy cheap viagra pills now!!! Click here!"));

        let events = service.check_new_content(Subject::Post(1)).await.unwrap();
        assert_eq!(events.len(), 2);
        // Spam merges into the open item; the TL0 author's edit adds one more.
        service.check_edited_content(Subject::Post(1), 10).await.unwrap();
        assert_eq!(service.queue_stats().await.unwrap().pending_count, 3);
    }

    #[tokio::test]
    async fn duplicate_detector_failure_is_non_fatal() {
        let h = harness();
        make_tl2(&h.service, 10).await;
        h.content.insert(ContentItem::post(1, 10, 100, EIGHTY_CHARS));
        h.content.fail_recent_queries(true);

        let events = h.service.check_new_content(Subject::Post(1)).await.unwrap();
        assert!(events.is_empty());
        // The failed check was not cached as "clean".
        assert!(h
            .cache
            .get(&h.service.duplicate_key(Subject::Post(1)))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn resolve_invalidates_and_is_terminal() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let item = h.service.list_pending(None, 1, 10).await.unwrap().items[0].clone();
        assert!(h.cache.get(&h.service.spam_key(Subject::Post(1))).unwrap().is_some());

        let (resolved, event) = h
            .service
            .resolve(item.id, 99, "approve".parse().unwrap(), Some("Looks fine"))
            .await
            .unwrap();
        assert_eq!(resolved.status, ReviewStatus::Approved);
        assert_eq!(
            event,
            ModerationEvent::ItemResolved {
                item_id: item.id,
                subject: Subject::Post(1),
                status: ReviewStatus::Approved,
                moderator_id: 99,
            }
        );
        assert!(h.cache.get(&h.service.spam_key(Subject::Post(1))).unwrap().is_none());

        let again = h.service.resolve(item.id, 99, ResolveAction::Reject, None).await;
        assert!(matches!(again, Err(ModerationError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn reopening_parked_item_behind_a_new_trigger_keeps_one_open() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let parked = h
            .service
            .list_pending(Some(ReviewType::NewUserPost), 1, 10)
            .await
            .unwrap()
            .items[0]
            .clone();
        h.service.request_info(parked.id, 5, None).await.unwrap();
        h.service.check_new_content(Subject::Post(1)).await.unwrap();

        let survivor = h.service.reopen(parked.id, 5).await.unwrap();
        assert_ne!(survivor.id, parked.id);

        let page = h
            .service
            .list_pending(Some(ReviewType::NewUserPost), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].id, survivor.id);
    }

    #[tokio::test]
    async fn resolved_event_names_the_resolving_moderator() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let item = h.service.list_pending(None, 1, 10).await.unwrap().items[0].clone();

        h.service.assign(item.id, 5).await.unwrap();
        let (resolved, event) = h
            .service
            .resolve(item.id, 99, ResolveAction::Approve, None)
            .await
            .unwrap();

        assert_eq!(resolved.assigned_moderator, Some(5));
        assert!(matches!(
            event,
            ModerationEvent::ItemResolved { moderator_id: 99, .. }
        ));
        let history = h.service.item_history(item.id).await.unwrap();
        assert_eq!(history.last().unwrap().moderator_id, Some(99));
    }

    #[tokio::test]
    async fn stats_are_cached_and_refreshed_on_mutation() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        assert_eq!(h.service.queue_stats().await.unwrap().pending_count, 0);

        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let stats = h.service.queue_stats().await.unwrap();
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.counts_by_type.get(&ReviewType::NewUserPost), Some(&1));

        let item_id = h.service.list_pending(None, 1, 10).await.unwrap().items[0].id;
        h.service.resolve(item_id, 1, ResolveAction::Reject, None).await.unwrap();
        let stats = h.service.queue_stats().await.unwrap();
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.rejected_count, 1);
        assert!(stats.avg_resolution_seconds.is_some());
    }

    #[tokio::test]
    async fn flagging_a_user_creates_user_report() {
        let h = harness();
        let outcome = h
            .service
            .flag_content(Subject::User(33), 5, "Harassing people in DMs", Priority::High)
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.item.review_type, ReviewType::UserReport);
        assert_eq!(outcome.item.reporter, Some(5));
        assert_eq!(outcome.item.author_id, Some(33));

        h.content.insert(ContentItem::post(2, 10, 100, CLEAN));
        let outcome = h
            .service
            .flag_content(Subject::Post(2), 5, "Off topic", Priority::Low)
            .await
            .unwrap();
        assert_eq!(outcome.item.review_type, ReviewType::FlaggedPost);
        assert_eq!(outcome.item.author_id, Some(10));
    }

    #[tokio::test]
    async fn behavior_check_promotes_and_flags_spammers() {
        let h = harness();
        for _ in 0..10 {
            h.service
                .trust()
                .record_activity(10, ActivityKind::PostRead)
                .await
                .unwrap();
        }
        h.service
            .trust()
            .record_activity(10, ActivityKind::ReadingTime(std::time::Duration::from_secs(700)))
            .await
            .unwrap();
        for id in 1..=3 {
            h.content.insert(ContentItem::post(
                id,
                10,
                100 + id,
                format!("Click here for free spins at our online casino, round {}", id),
            ));
        }

        let events = h.service.check_user_behavior(10).await.unwrap();
        assert!(matches!(events[0], ModerationEvent::TrustPromoted(_)));
        assert_eq!(events.len(), 2);

        let page = h
            .service
            .list_pending(Some(ReviewType::TrustLevelReview), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.items[0].subject, Subject::User(10));
        assert_eq!(page.items[0].priority, Priority::High);

        // Nothing new the second time round.
        assert!(h.service.check_user_behavior(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn behavior_check_catches_bursts_from_new_users() {
        let h = harness();
        for id in 1..=10 {
            h.content.insert(ContentItem::post(
                id,
                20,
                500,
                format!("Perfectly polite reply number {} about ownership", id),
            ));
        }

        let events = h.service.check_user_behavior(20).await.unwrap();
        assert_eq!(events.len(), 1);
        let page = h.service.list_pending(None, 1, 10).await.unwrap();
        assert_eq!(page.items[0].priority, Priority::Medium);
    }

    #[tokio::test]
    async fn recalculation_picks_up_trust_changes() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let before = h.service.list_pending(None, 1, 10).await.unwrap().items[0].clone();

        h.service.trust().set_level(10, TrustLevel::Tl3).await.unwrap();
        let report = h.service.recalculate_priorities().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.significant, 1);

        let after = h.service.queue().get(before.id).await.unwrap().unwrap();
        assert!((before.score - after.score - 15.0).abs() < 0.01);
        assert_eq!(after.status, before.status);
    }

    #[tokio::test]
    async fn cleanup_keeps_recent_and_open_items() {
        let h = harness();
        h.content.insert(ContentItem::post(1, 10, 100, CLEAN));
        h.service.check_new_content(Subject::Post(1)).await.unwrap();
        let item_id = h.service.list_pending(None, 1, 10).await.unwrap().items[0].id;
        h.service.resolve(item_id, 1, ResolveAction::Approve, None).await.unwrap();

        assert_eq!(h.service.cleanup_resolved().await.unwrap(), 0);
        assert!(h.service.queue().get(item_id).await.unwrap().is_some());
    }
}
