// Review queue domain models.
//
// Pure data types. The state machine that mutates them lives in
// `review_queue.rs`; the ordering score in `priority_scorer.rs`.

use crate::core::content::Subject;
use crate::core::errors::ModerationError;
use crate::core::trust::TrustLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Why an item is in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    FlaggedPost,
    NewUserPost,
    EditedPost,
    UserReport,
    SpamDetection,
    TrustLevelReview,
}

impl ReviewType {
    pub const ALL: [ReviewType; 6] = [
        ReviewType::FlaggedPost,
        ReviewType::NewUserPost,
        ReviewType::EditedPost,
        ReviewType::UserReport,
        ReviewType::SpamDetection,
        ReviewType::TrustLevelReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::FlaggedPost => "flagged_post",
            ReviewType::NewUserPost => "new_user_post",
            ReviewType::EditedPost => "edited_post",
            ReviewType::UserReport => "user_report",
            ReviewType::SpamDetection => "spam_detection",
            ReviewType::TrustLevelReview => "trust_level_review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Whether `subject` is something this kind of review can be about.
    pub fn accepts(&self, subject: &Subject) -> bool {
        match self {
            ReviewType::UserReport => true,
            ReviewType::TrustLevelReview => matches!(subject, Subject::User(_)),
            _ => subject.is_content(),
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    NeedsInfo,
    Escalated,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::NeedsInfo => "needs_info",
            ReviewStatus::Escalated => "escalated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            "needs_info" => Some(ReviewStatus::NeedsInfo),
            "escalated" => Some(ReviewStatus::Escalated),
            _ => None,
        }
    }

    /// Approved and rejected items never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected)
    }

    /// In the working queue: listed, de-duplicated against, re-scored.
    pub fn is_open(&self) -> bool {
        matches!(self, ReviewStatus::Pending | ReviewStatus::Escalated)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse urgency tier. Lower number = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Priority::Critical),
            2 => Some(Priority::High),
            3 => Some(Priority::Medium),
            4 => Some(Priority::Low),
            _ => None,
        }
    }

    /// One step more urgent, stopping at `Critical`.
    pub fn raised(self) -> Self {
        Self::from_u8(self.as_u8().saturating_sub(1)).unwrap_or(Priority::Critical)
    }
}

/// Moderator decision on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    Approve,
    Reject,
}

impl ResolveAction {
    pub fn status(&self) -> ReviewStatus {
        match self {
            ResolveAction::Approve => ReviewStatus::Approved,
            ResolveAction::Reject => ReviewStatus::Rejected,
        }
    }
}

impl FromStr for ResolveAction {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(ResolveAction::Approve),
            "reject" => Ok(ResolveAction::Reject),
            other => Err(ModerationError::InvalidTransition(format!(
                "Unsupported action '{}'",
                other
            ))),
        }
    }
}

/// Everything needed to put something in the queue.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub review_type: ReviewType,
    pub subject: Option<Subject>,
    /// Authoring user for content, the reported user for user reviews.
    pub author_id: Option<u64>,
    pub author_trust: Option<TrustLevel>,
    pub reason: String,
    pub priority: Priority,
    pub reporter: Option<u64>,
}

impl EnqueueRequest {
    pub fn new(review_type: ReviewType, subject: Subject, priority: Priority) -> Self {
        Self {
            review_type,
            subject: Some(subject),
            author_id: match subject {
                Subject::User(id) => Some(id),
                _ => None,
            },
            author_trust: None,
            reason: String::new(),
            priority,
            reporter: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn author(mut self, author_id: u64, trust: Option<TrustLevel>) -> Self {
        self.author_id = Some(author_id);
        self.author_trust = trust;
        self
    }

    pub fn reporter(mut self, reporter: u64) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

/// A validated request ready to be stored. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewReviewItem {
    pub review_type: ReviewType,
    pub subject: Subject,
    pub author_id: Option<u64>,
    pub author_trust: Option<TrustLevel>,
    pub reason: String,
    pub priority: Priority,
    pub reporter: Option<u64>,
    pub score: f64,
}

/// One unit of moderation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: u64,
    pub review_type: ReviewType,
    pub status: ReviewStatus,
    pub priority: Priority,
    /// Derived from the other fields on every mutation.
    pub score: f64,
    pub subject: Subject,
    pub author_id: Option<u64>,
    /// Trust level of `author_id` when last scored.
    pub author_trust: Option<TrustLevel>,
    pub reporter: Option<u64>,
    pub assigned_moderator: Option<u64>,
    pub reason: String,
    pub moderator_notes: String,
    pub resolution_notes: String,
    pub created_at: DateTime<Utc>,
    /// Set once, on the first move into approved or rejected.
    pub resolved_at: Option<DateTime<Utc>>,
    pub upvotes: u32,
}

impl ReviewQueueItem {
    /// Build the stored form of a new item.
    pub fn from_new(id: u64, new: NewReviewItem, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            review_type: new.review_type,
            status: ReviewStatus::Pending,
            priority: new.priority,
            score: new.score,
            subject: new.subject,
            author_id: new.author_id,
            author_trust: new.author_trust,
            reporter: new.reporter,
            assigned_moderator: None,
            reason: new.reason,
            moderator_notes: String::new(),
            resolution_notes: String::new(),
            created_at,
            resolved_at: None,
            upvotes: 0,
        }
    }

    pub fn add_moderator_note(&mut self, note: &str) {
        if note.is_empty() {
            return;
        }
        if !self.moderator_notes.is_empty() {
            self.moderator_notes.push('\n');
        }
        self.moderator_notes.push_str(note);
    }
}

/// Kinds of audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Enqueued,
    PriorityRaised,
    Approved,
    Rejected,
    Escalated,
    InfoRequested,
    Reopened,
    Merged,
    Assigned,
    ScoreRecalculated,
    Cleanup,
    TrustPromoted,
}

impl LogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogAction::Enqueued => "enqueued",
            LogAction::PriorityRaised => "priority_raised",
            LogAction::Approved => "approved",
            LogAction::Rejected => "rejected",
            LogAction::Escalated => "escalated",
            LogAction::InfoRequested => "info_requested",
            LogAction::Reopened => "reopened",
            LogAction::Merged => "merged",
            LogAction::Assigned => "assigned",
            LogAction::ScoreRecalculated => "score_recalculated",
            LogAction::Cleanup => "cleanup",
            LogAction::TrustPromoted => "trust_promoted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            LogAction::Enqueued,
            LogAction::PriorityRaised,
            LogAction::Approved,
            LogAction::Rejected,
            LogAction::Escalated,
            LogAction::InfoRequested,
            LogAction::Reopened,
            LogAction::Merged,
            LogAction::Assigned,
            LogAction::ScoreRecalculated,
            LogAction::Cleanup,
            LogAction::TrustPromoted,
        ]
        .into_iter()
        .find(|a| a.as_str() == value)
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub action: LogAction,
    /// `None` for system actions.
    pub moderator_id: Option<u64>,
    pub item_id: Option<u64>,
    pub subject: Option<Subject>,
    pub reason: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ModerationLogEntry {
    pub fn for_item(
        action: LogAction,
        moderator_id: Option<u64>,
        item: &ReviewQueueItem,
        reason: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            moderator_id,
            item_id: Some(item.id),
            subject: Some(item.subject),
            reason: reason.into(),
            details,
            timestamp: Utc::now(),
        }
    }

    pub fn system(
        action: LogAction,
        subject: Option<Subject>,
        reason: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            moderator_id: None,
            item_id: None,
            subject,
            reason: reason.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// One page of the open queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePage {
    pub items: Vec<ReviewQueueItem>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_count: u64,
    pub escalated_count: u64,
    pub needs_info_count: u64,
    pub approved_count: u64,
    pub rejected_count: u64,
    /// Open items only.
    pub counts_by_type: BTreeMap<ReviewType, u64>,
    /// Open items only, keyed by priority number.
    pub counts_by_priority: BTreeMap<u8, u64>,
    /// Mean of `resolved_at - created_at` over resolved items.
    pub avg_resolution_seconds: Option<f64>,
}
