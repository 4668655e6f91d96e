// Near-duplicate detection over a bounded window of recent content.
//
// Candidates are the most recent items (at most `max_candidates`, no older
// than `window`) by the same author OR in the same thread. On a busy thread
// that means older duplicates can be missed; the bound keeps the cost of one
// check flat no matter how large the thread gets.

use crate::core::content::{ContentItem, ContentSource, RecentContentQuery, Subject};
use crate::core::errors::ModerationError;
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;

/// Version of the comparison rules; part of every cached duplicate flag key.
pub const DUPLICATE_RULE_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct DuplicateConfig {
    /// Shorter content is never compared.
    pub min_length: usize,
    pub window: Duration,
    pub max_candidates: usize,
    /// Jaccard similarity strictly above this is a duplicate.
    pub similarity_threshold: f64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_length: 50,
            window: Duration::days(7),
            max_candidates: 100,
            similarity_threshold: 0.9,
        }
    }
}

/// The earlier item a piece of content duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub original: Subject,
    /// 1.0 for an exact match.
    pub similarity: f64,
}

pub struct DuplicateDetector<C: ContentSource> {
    source: Arc<C>,
    config: DuplicateConfig,
}

impl<C: ContentSource> DuplicateDetector<C> {
    pub fn new(source: Arc<C>) -> Self {
        Self::with_config(source, DuplicateConfig::default())
    }

    pub fn with_config(source: Arc<C>, config: DuplicateConfig) -> Self {
        Self { source, config }
    }

    pub fn rule_version(&self) -> u32 {
        DUPLICATE_RULE_VERSION
    }

    pub async fn is_duplicate(&self, content: &ContentItem) -> Result<bool, ModerationError> {
        Ok(self.find_duplicate(content).await?.is_some())
    }

    /// Find an earlier item `content` duplicates, if any.
    ///
    /// Only content created at or before `content` is considered, so the
    /// first of two identical posts is never flagged.
    pub async fn find_duplicate(
        &self,
        content: &ContentItem,
    ) -> Result<Option<DuplicateMatch>, ModerationError> {
        if content.body.chars().count() < self.config.min_length {
            return Ok(None);
        }

        let query = RecentContentQuery {
            author_id: Some(content.author_id),
            thread_id: Some(content.thread_id),
            since: content.created_at - self.config.window,
            until: Some(content.created_at),
            exclude: Some(content.subject),
            limit: self.config.max_candidates,
        };
        let candidates = self.source.recent_content(&query).await?;

        let words = word_set(&content.body);
        for candidate in candidates.iter().take(self.config.max_candidates) {
            if candidate.body == content.body {
                return Ok(Some(DuplicateMatch {
                    original: candidate.subject,
                    similarity: 1.0,
                }));
            }

            let similarity = jaccard(&words, &word_set(&candidate.body));
            if similarity > self.config.similarity_threshold {
                return Ok(Some(DuplicateMatch {
                    original: candidate.subject,
                    similarity,
                }));
            }
        }

        Ok(None)
    }
}

/// Lower-cased whitespace tokens.
fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// `|A ∩ B| / |A ∪ B|`, 0.0 when both are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct VecSource {
        items: Mutex<Vec<ContentItem>>,
    }

    impl VecSource {
        fn new(items: Vec<ContentItem>) -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(items),
            })
        }
    }

    #[async_trait]
    impl ContentSource for VecSource {
        async fn get_content(
            &self,
            subject: Subject,
        ) -> Result<Option<ContentItem>, ModerationError> {
            let items = self.items.lock().unwrap();
            Ok(items.iter().find(|i| i.subject == subject).cloned())
        }

        async fn recent_content(
            &self,
            query: &RecentContentQuery,
        ) -> Result<Vec<ContentItem>, ModerationError> {
            let items = self.items.lock().unwrap();
            let mut matching: Vec<ContentItem> =
                items.iter().filter(|i| query.matches(i)).cloned().collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            matching.truncate(query.limit);
            Ok(matching)
        }
    }

    const EIGHTY_CHARS: &str =
        "This exact paragraph is exactly eighty characters long, give or take a few ones.";

    #[tokio::test]
    async fn second_identical_post_is_duplicate() {
        let now = Utc::now();
        let first = ContentItem::post(1, 7, 100, EIGHTY_CHARS).created_at(now - Duration::hours(2));
        let second = ContentItem::post(2, 7, 200, EIGHTY_CHARS).created_at(now);
        let detector = DuplicateDetector::new(VecSource::new(vec![first.clone(), second.clone()]));

        assert!(!detector.is_duplicate(&first).await.unwrap());
        let found = detector.find_duplicate(&second).await.unwrap().unwrap();
        assert_eq!(found.original, Subject::Post(1));
        assert_eq!(found.similarity, 1.0);
    }

    #[tokio::test]
    async fn short_content_is_skipped() {
        let now = Utc::now();
        let a = ContentItem::post(1, 7, 100, "+1").created_at(now - Duration::minutes(5));
        let b = ContentItem::post(2, 7, 100, "+1").created_at(now);
        let detector = DuplicateDetector::new(VecSource::new(vec![a, b.clone()]));

        assert!(!detector.is_duplicate(&b).await.unwrap());
    }

    #[tokio::test]
    async fn near_duplicate_in_same_thread_by_other_author() {
        let now = Utc::now();
        let words: Vec<String> = (0..20).map(|i| format!("word{}", i)).collect();
        let original = words.join(" ");
        // Same 20 words plus one extra: 20/21 > 0.9.
        let tweaked = format!("{} extra", original.to_uppercase());

        let a = ContentItem::post(1, 1, 50, original).created_at(now - Duration::hours(1));
        let b = ContentItem::post(2, 2, 50, tweaked).created_at(now);
        let detector = DuplicateDetector::new(VecSource::new(vec![a, b.clone()]));

        let found = detector.find_duplicate(&b).await.unwrap().unwrap();
        assert!(found.similarity > 0.9 && found.similarity < 1.0);
    }

    #[tokio::test]
    async fn old_or_unrelated_content_is_ignored() {
        let now = Utc::now();
        let old = ContentItem::post(1, 7, 100, EIGHTY_CHARS).created_at(now - Duration::days(8));
        let stranger =
            ContentItem::post(2, 9, 300, EIGHTY_CHARS).created_at(now - Duration::hours(1));
        let current = ContentItem::post(3, 7, 100, EIGHTY_CHARS).created_at(now);
        let detector = DuplicateDetector::new(VecSource::new(vec![old, stranger, current.clone()]));

        assert!(!detector.is_duplicate(&current).await.unwrap());
    }

    #[tokio::test]
    async fn candidate_window_is_bounded() {
        let now = Utc::now();
        let mut items = vec![
            ContentItem::post(1, 7, 100, EIGHTY_CHARS).created_at(now - Duration::hours(3)),
        ];
        // Two newer, unrelated posts by the same author crowd the original out.
        for id in 2..=3 {
            let body = format!("filler post number {} with enough words to count", id);
            items.push(ContentItem::post(id, 7, 100, body).created_at(now - Duration::hours(1)));
        }
        let current = ContentItem::post(4, 7, 100, EIGHTY_CHARS).created_at(now);
        items.push(current.clone());

        let config = DuplicateConfig {
            max_candidates: 2,
            ..Default::default()
        };
        let detector = DuplicateDetector::with_config(VecSource::new(items), config);

        assert!(!detector.is_duplicate(&current).await.unwrap());
    }

    #[test]
    fn jaccard_basics() {
        let a = word_set("the quick brown fox");
        let b = word_set("The QUICK brown dog");
        assert!((jaccard(&a, &b) - 3.0 / 5.0).abs() < 1e-9);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }
}
