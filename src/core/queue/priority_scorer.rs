// Priority score - the number the queue is actually sorted by.
//
// score = tier base + age bonus + upvotes * 10 + trust bonus + type bonus

use super::queue_models::{NewReviewItem, Priority, ReviewQueueItem, ReviewType};
use crate::core::trust::TrustLevel;
use chrono::{DateTime, Utc};

const AGE_BONUS_PER_HOUR: f64 = 0.5;
const MAX_AGE_BONUS: f64 = 50.0;
const UPVOTE_WEIGHT: f64 = 10.0;
const TRUST_WEIGHT: f64 = 5.0;

/// The fields the formula reads.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    pub priority: Priority,
    pub review_type: ReviewType,
    pub upvotes: u32,
    pub author_trust: Option<TrustLevel>,
    /// `None` until the item has been stored; counts as zero age.
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&ReviewQueueItem> for ScoreInputs {
    fn from(item: &ReviewQueueItem) -> Self {
        Self {
            priority: item.priority,
            review_type: item.review_type,
            upvotes: item.upvotes,
            author_trust: item.author_trust,
            created_at: Some(item.created_at),
        }
    }
}

impl From<&NewReviewItem> for ScoreInputs {
    fn from(item: &NewReviewItem) -> Self {
        Self {
            priority: item.priority,
            review_type: item.review_type,
            upvotes: 0,
            author_trust: item.author_trust,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScorer;

impl PriorityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(&self, inputs: &ScoreInputs, now: DateTime<Utc>) -> f64 {
        Self::tier_base(inputs.priority)
            + Self::age_bonus(inputs.created_at, now)
            + inputs.upvotes as f64 * UPVOTE_WEIGHT
            + Self::trust_bonus(inputs.author_trust)
            + Self::type_bonus(inputs.review_type)
    }

    pub fn tier_base(priority: Priority) -> f64 {
        match priority {
            Priority::Critical => 100.0,
            Priority::High => 75.0,
            Priority::Medium => 50.0,
            Priority::Low => 25.0,
        }
    }

    pub fn age_bonus(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(created_at) = created_at else {
            return 0.0;
        };
        let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
        (age_hours * AGE_BONUS_PER_HOUR).min(MAX_AGE_BONUS)
    }

    /// Less trusted users surface faster; unknown counts as TL0.
    pub fn trust_bonus(level: Option<TrustLevel>) -> f64 {
        let level = level.unwrap_or(TrustLevel::Tl0).as_u8() as f64;
        (4.0 - level) * TRUST_WEIGHT
    }

    pub fn type_bonus(review_type: ReviewType) -> f64 {
        match review_type {
            ReviewType::SpamDetection => 30.0,
            ReviewType::FlaggedPost => 25.0,
            ReviewType::UserReport => 20.0,
            ReviewType::NewUserPost => 10.0,
            ReviewType::EditedPost => 5.0,
            ReviewType::TrustLevelReview => 5.0,
        }
    }
}
