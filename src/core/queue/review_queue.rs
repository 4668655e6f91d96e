// Review queue - entity store port plus the item state machine.
//
//   pending ──> approved | rejected | needs_info | escalated
//   escalated ──> approved | rejected | needs_info
//   needs_info ──> pending | escalated | approved | rejected
//
// approved/rejected are terminal. Every transition writes exactly one audit
// entry and recomputes the item's score.

use super::priority_scorer::{PriorityScorer, ScoreInputs};
use super::queue_models::{
    EnqueueRequest, LogAction, ModerationLogEntry, NewReviewItem, QueuePage, QueueStats,
    ResolveAction, ReviewQueueItem, ReviewStatus, ReviewType,
};
use crate::core::content::Subject;
use crate::core::errors::ModerationError;
use crate::core::locks::KeyedLocks;
use crate::core::trust::TrustLevel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// The open (pending or escalated) item for `(review_type, subject)`, if any.
    async fn find_open(
        &self,
        review_type: ReviewType,
        subject: Subject,
    ) -> Result<Option<ReviewQueueItem>, ModerationError>;

    /// Store a new pending item.
    ///
    /// If an open item for the same `(review_type, subject)` already exists the
    /// store must not create a second one: it lowers the existing item's
    /// priority to the more urgent of the two and returns it with `false`.
    async fn insert_or_merge(
        &self,
        item: NewReviewItem,
    ) -> Result<(ReviewQueueItem, bool), ModerationError>;

    async fn get(&self, item_id: u64) -> Result<Option<ReviewQueueItem>, ModerationError>;

    /// Replace every mutable field of an existing item.
    async fn update(&self, item: &ReviewQueueItem) -> Result<(), ModerationError>;

    /// Touch only the score columns; status is left alone.
    async fn update_score(
        &self,
        item_id: u64,
        score: f64,
        author_trust: Option<TrustLevel>,
    ) -> Result<(), ModerationError>;

    /// Open items ordered by `(score desc, created_at desc)`, plus the total count.
    async fn list_open(
        &self,
        filter: Option<ReviewType>,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<ReviewQueueItem>, u64), ModerationError>;

    async fn open_items(&self) -> Result<Vec<ReviewQueueItem>, ModerationError>;

    async fn stats(&self) -> Result<QueueStats, ModerationError>;

    /// Delete approved/rejected items resolved before `cutoff`. Returns how many.
    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ModerationError>;

    async fn append_log(&self, entry: ModerationLogEntry) -> Result<(), ModerationError>;

    /// Audit entries for one item, oldest first.
    async fn logs_for_item(
        &self,
        item_id: u64,
    ) -> Result<Vec<ModerationLogEntry>, ModerationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Result of `ReviewQueue::enqueue`.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub item: ReviewQueueItem,
    /// `false` when the request merged into an existing open item.
    pub created: bool,
}

/// What a transition writes to the audit log: action, reason, details.
type TransitionResult = Result<(LogAction, String, serde_json::Value), ModerationError>;

/// Ways a parked or pending item goes (back) into the working queue.
enum Reentry {
    Reopen,
    Escalate(String),
}

impl Reentry {
    fn apply(self, item: &mut ReviewQueueItem) -> TransitionResult {
        match self {
            Reentry::Reopen => {
                if item.status != ReviewStatus::NeedsInfo {
                    return Err(ModerationError::InvalidTransition(format!(
                        "Cannot reopen queue item {} from {}",
                        item.id, item.status
                    )));
                }
                item.status = ReviewStatus::Pending;
                Ok((LogAction::Reopened, String::new(), json!({})))
            }
            Reentry::Escalate(notes) => {
                if !matches!(item.status, ReviewStatus::Pending | ReviewStatus::NeedsInfo) {
                    return Err(ModerationError::InvalidTransition(format!(
                        "Cannot escalate queue item {} from {}",
                        item.id, item.status
                    )));
                }
                let old_priority = item.priority;
                item.status = ReviewStatus::Escalated;
                item.priority = item.priority.raised();
                item.add_moderator_note(&notes);
                Ok((
                    LogAction::Escalated,
                    notes,
                    json!({
                        "from_priority": old_priority.as_u8(),
                        "to_priority": item.priority.as_u8(),
                    }),
                ))
            }
        }
    }
}

pub struct ReviewQueue<Q: QueueStore> {
    store: Q,
    scorer: PriorityScorer,
    /// Serializes find-or-create per (type, subject).
    subject_locks: KeyedLocks<(ReviewType, Subject)>,
    /// Serializes transitions per item.
    item_locks: KeyedLocks<u64>,
}

impl<Q: QueueStore> ReviewQueue<Q> {
    pub fn new(store: Q) -> Self {
        Self {
            store,
            scorer: PriorityScorer::new(),
            subject_locks: KeyedLocks::new(),
            item_locks: KeyedLocks::new(),
        }
    }

    fn rescore(&self, item: &mut ReviewQueueItem) {
        item.score = self.scorer.compute(&ScoreInputs::from(&*item), Utc::now());
    }

    /// Add work to the queue, merging into an existing open item for the same
    /// `(review_type, subject)` instead of creating a second one.
    pub async fn enqueue(
        &self,
        request: EnqueueRequest,
    ) -> Result<EnqueueOutcome, ModerationError> {
        let subject = request.subject.ok_or_else(|| {
            ModerationError::ValidationFailure("Enqueue request has no subject".to_string())
        })?;
        if !request.review_type.accepts(&subject) {
            return Err(ModerationError::ValidationFailure(format!(
                "{} review cannot target {}",
                request.review_type, subject
            )));
        }

        let _subject_guard = self.subject_locks.lock((request.review_type, subject)).await;

        if let Some(existing) = self.store.find_open(request.review_type, subject).await? {
            if let Some(merged) = self.merge_into(existing.id, &request).await? {
                return Ok(EnqueueOutcome {
                    item: merged,
                    created: false,
                });
            }
        }

        let mut new_item = NewReviewItem {
            review_type: request.review_type,
            subject,
            author_id: request.author_id,
            author_trust: request.author_trust,
            reason: request.reason.clone(),
            priority: request.priority,
            reporter: request.reporter,
            score: 0.0,
        };
        new_item.score = self.scorer.compute(&ScoreInputs::from(&new_item), Utc::now());

        let (item, created) = self.store.insert_or_merge(new_item).await?;
        if !created {
            // Another writer got there first (e.g. a second process); the store
            // already applied the more urgent priority.
            tracing::debug!(item_id = item.id, "Enqueue merged at the store level");
            let _item_guard = self.item_locks.lock(item.id).await;
            let mut item = self.store.get(item.id).await?.unwrap_or(item);
            self.rescore(&mut item);
            self.store
                .update_score(item.id, item.score, item.author_trust)
                .await?;
            return Ok(EnqueueOutcome {
                item,
                created: false,
            });
        }

        self.store
            .append_log(ModerationLogEntry::for_item(
                LogAction::Enqueued,
                request.reporter,
                &item,
                item.reason.clone(),
                json!({
                    "review_type": item.review_type.as_str(),
                    "priority": item.priority.as_u8(),
                    "score": item.score,
                }),
            ))
            .await?;

        tracing::info!(
            item_id = item.id,
            review_type = %item.review_type,
            subject = %item.subject,
            priority = item.priority.as_u8(),
            score = item.score,
            "Queued for review"
        );
        Ok(EnqueueOutcome {
            item,
            created: true,
        })
    }

    /// Fold a repeated request into an open item. `None` if the item closed
    /// in the meantime.
    async fn merge_into(
        &self,
        item_id: u64,
        request: &EnqueueRequest,
    ) -> Result<Option<ReviewQueueItem>, ModerationError> {
        let _item_guard = self.item_locks.lock(item_id).await;

        let Some(mut item) = self.store.get(item_id).await? else {
            return Ok(None);
        };
        if !item.status.is_open() {
            return Ok(None);
        }

        let old_priority = item.priority;
        if request.priority < item.priority {
            item.priority = request.priority;
        }
        if request.author_trust.is_some() {
            item.author_trust = request.author_trust;
        }
        self.rescore(&mut item);
        self.store.update(&item).await?;

        if item.priority != old_priority {
            self.store
                .append_log(ModerationLogEntry::for_item(
                    LogAction::PriorityRaised,
                    request.reporter,
                    &item,
                    request.reason.clone(),
                    json!({
                        "from": old_priority.as_u8(),
                        "to": item.priority.as_u8(),
                    }),
                ))
                .await?;
        }

        tracing::debug!(
            item_id = item.id,
            priority = item.priority.as_u8(),
            "Merged repeated enqueue into open item"
        );
        Ok(Some(item))
    }

    async fn load(&self, item_id: u64) -> Result<ReviewQueueItem, ModerationError> {
        self.store
            .get(item_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Queue item {}", item_id)))
    }

    /// Load an item under its lock and commit the change `apply` describes.
    async fn transition<F>(
        &self,
        item_id: u64,
        moderator_id: Option<u64>,
        apply: F,
    ) -> Result<ReviewQueueItem, ModerationError>
    where
        F: FnOnce(&mut ReviewQueueItem) -> TransitionResult + Send,
    {
        let _item_guard = self.item_locks.lock(item_id).await;
        let item = self.load(item_id).await?;
        self.commit_transition(item, moderator_id, apply).await
    }

    /// Let `apply` mutate an item whose lock the caller holds, rescore,
    /// persist and write the audit entry `apply` describes.
    async fn commit_transition<F>(
        &self,
        mut item: ReviewQueueItem,
        moderator_id: Option<u64>,
        apply: F,
    ) -> Result<ReviewQueueItem, ModerationError>
    where
        F: FnOnce(&mut ReviewQueueItem) -> TransitionResult + Send,
    {
        let previous = item.status;

        let (action, reason, mut details) = apply(&mut item)?;
        self.rescore(&mut item);
        self.store.update(&item).await?;

        if let Some(map) = details.as_object_mut() {
            map.insert("previous_status".to_string(), json!(previous.as_str()));
            map.insert("status".to_string(), json!(item.status.as_str()));
        }
        self.store
            .append_log(ModerationLogEntry::for_item(
                action,
                moderator_id,
                &item,
                reason,
                details,
            ))
            .await?;

        tracing::info!(
            item_id = item.id,
            moderator_id,
            action = action.as_str(),
            from = %previous,
            to = %item.status,
            "Queue item transition"
        );
        Ok(item)
    }

    /// Approve or reject. Fails with `InvalidTransition` on terminal items.
    pub async fn resolve(
        &self,
        item_id: u64,
        moderator_id: u64,
        action: ResolveAction,
        notes: Option<&str>,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let notes = notes.unwrap_or_default().to_string();
        self.transition(item_id, Some(moderator_id), move |item| {
            if item.status.is_terminal() {
                return Err(ModerationError::InvalidTransition(format!(
                    "Queue item {} is already {}",
                    item.id, item.status
                )));
            }
            item.status = action.status();
            if item.resolved_at.is_none() {
                item.resolved_at = Some(Utc::now());
            }
            item.assigned_moderator.get_or_insert(moderator_id);
            item.resolution_notes = notes.clone();

            let log_action = match action {
                ResolveAction::Approve => LogAction::Approved,
                ResolveAction::Reject => LogAction::Rejected,
            };
            Ok((log_action, notes, json!({ "review_type": item.review_type.as_str() })))
        })
        .await
    }

    /// Mark as needing senior attention; priority moves one step more urgent.
    pub async fn escalate(
        &self,
        item_id: u64,
        moderator_id: u64,
        notes: Option<&str>,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let notes = notes.unwrap_or_default().to_string();
        self.return_to_queue(item_id, moderator_id, Reentry::Escalate(notes)).await
    }

    /// Park an item until someone supplies more information.
    pub async fn request_info(
        &self,
        item_id: u64,
        moderator_id: u64,
        notes: Option<&str>,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let notes = notes.unwrap_or_default().to_string();
        self.transition(item_id, Some(moderator_id), move |item| {
            if !item.status.is_open() {
                return Err(ModerationError::InvalidTransition(format!(
                    "Cannot request info on queue item {} from {}",
                    item.id, item.status
                )));
            }
            item.status = ReviewStatus::NeedsInfo;
            item.add_moderator_note(&notes);
            Ok((LogAction::InfoRequested, notes, json!({})))
        })
        .await
    }

    /// Move a parked item back to pending.
    pub async fn reopen(
        &self,
        item_id: u64,
        moderator_id: u64,
    ) -> Result<ReviewQueueItem, ModerationError> {
        self.return_to_queue(item_id, moderator_id, Reentry::Reopen).await
    }

    /// Reopen or escalate under the subject lock.
    ///
    /// A `needs_info` item is outside the de-duplication set, so a later
    /// trigger may have opened another item for the same `(type, subject)`.
    /// In that case the parked item is folded into the open one instead of
    /// becoming a second open item.
    async fn return_to_queue(
        &self,
        item_id: u64,
        moderator_id: u64,
        reentry: Reentry,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let key = {
            let item = self.load(item_id).await?;
            (item.review_type, item.subject)
        };
        let _subject_guard = self.subject_locks.lock(key).await;

        let other = self
            .store
            .find_open(key.0, key.1)
            .await?
            .filter(|open| open.id != item_id);
        let Some(other) = other else {
            return self
                .transition(item_id, Some(moderator_id), move |item| reentry.apply(item))
                .await;
        };

        // Two item locks: always lowest id first.
        let _first_guard = self.item_locks.lock(item_id.min(other.id)).await;
        let _second_guard = self.item_locks.lock(item_id.max(other.id)).await;

        let parked = self.load(item_id).await?;
        let survivor = match self.store.get(other.id).await? {
            Some(open) if open.status.is_open() && parked.status == ReviewStatus::NeedsInfo => open,
            // Nothing to fold: the other item closed meanwhile, or this one is
            // not parked and the usual checks reject the move.
            _ => {
                return self
                    .commit_transition(parked, Some(moderator_id), move |item| reentry.apply(item))
                    .await
            }
        };

        self.fold_parked(parked, survivor, moderator_id, reentry).await
    }

    /// Close `parked` as merged and carry its urgency, votes and notes over to
    /// `survivor`. Both item locks must be held.
    async fn fold_parked(
        &self,
        mut parked: ReviewQueueItem,
        mut survivor: ReviewQueueItem,
        moderator_id: u64,
        reentry: Reentry,
    ) -> Result<ReviewQueueItem, ModerationError> {
        let merge_note = format!("Merged into queue item {}", survivor.id);
        parked.status = ReviewStatus::Rejected;
        parked.resolved_at = Some(Utc::now());
        parked.resolution_notes = merge_note.clone();
        self.rescore(&mut parked);
        self.store.update(&parked).await?;
        self.store
            .append_log(ModerationLogEntry::for_item(
                LogAction::Merged,
                Some(moderator_id),
                &parked,
                merge_note,
                json!({
                    "merged_into": survivor.id,
                    "previous_status": ReviewStatus::NeedsInfo.as_str(),
                    "status": parked.status.as_str(),
                }),
            ))
            .await?;

        let old_priority = survivor.priority;
        survivor.priority = survivor.priority.min(parked.priority);
        survivor.upvotes += parked.upvotes;
        survivor.add_moderator_note(&parked.moderator_notes);
        if survivor.assigned_moderator.is_none() {
            survivor.assigned_moderator = parked.assigned_moderator;
        }
        if survivor.author_trust.is_none() {
            survivor.author_trust = parked.author_trust;
        }

        tracing::info!(
            parked_id = parked.id,
            survivor_id = survivor.id,
            "Folded parked queue item into open duplicate"
        );

        let parked_id = parked.id;
        let absorbed = json!({
            "absorbed": parked_id,
            "from_priority": old_priority.as_u8(),
            "to_priority": survivor.priority.as_u8(),
        });
        match reentry {
            Reentry::Escalate(notes) if survivor.status == ReviewStatus::Pending => {
                self.commit_transition(survivor, Some(moderator_id), move |item| {
                    let (action, reason, mut details) = Reentry::Escalate(notes).apply(item)?;
                    if let Some(map) = details.as_object_mut() {
                        map.insert("absorbed".to_string(), json!(parked_id));
                    }
                    Ok((action, reason, details))
                })
                .await
            }
            reentry => {
                if let Reentry::Escalate(notes) = reentry {
                    survivor.add_moderator_note(&notes);
                }
                self.commit_transition(survivor, Some(moderator_id), move |_| {
                    Ok((LogAction::Merged, String::new(), absorbed))
                })
                .await
            }
        }
    }

    pub async fn assign(
        &self,
        item_id: u64,
        moderator_id: u64,
    ) -> Result<ReviewQueueItem, ModerationError> {
        self.transition(item_id, Some(moderator_id), move |item| {
            if item.status.is_terminal() {
                return Err(ModerationError::InvalidTransition(format!(
                    "Cannot assign resolved queue item {}",
                    item.id
                )));
            }
            let previous = item.assigned_moderator.replace(moderator_id);
            Ok((
                LogAction::Assigned,
                String::new(),
                json!({ "previous_moderator": previous }),
            ))
        })
        .await
    }

    /// Community upvote. Not an audited transition, but the score moves.
    pub async fn upvote(&self, item_id: u64) -> Result<ReviewQueueItem, ModerationError> {
        let _item_guard = self.item_locks.lock(item_id).await;

        let mut item = self
            .store
            .get(item_id)
            .await?
            .ok_or_else(|| ModerationError::NotFound(format!("Queue item {}", item_id)))?;
        if item.status.is_terminal() {
            return Err(ModerationError::InvalidTransition(format!(
                "Cannot upvote resolved queue item {}",
                item_id
            )));
        }
        item.upvotes += 1;
        self.rescore(&mut item);
        self.store.update(&item).await?;
        Ok(item)
    }

    pub async fn get(&self, item_id: u64) -> Result<Option<ReviewQueueItem>, ModerationError> {
        self.store.get(item_id).await
    }

    /// Page through open items, 1-based. Page size is clamped to `1..=100`.
    pub async fn list_pending(
        &self,
        filter: Option<ReviewType>,
        page: u32,
        page_size: u32,
    ) -> Result<QueuePage, ModerationError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page as u64 - 1) * page_size as u64;

        let (items, total_count) = self
            .store
            .list_open(filter, offset, page_size as u64)
            .await?;
        Ok(QueuePage {
            items,
            total_count,
            page,
            page_size,
        })
    }

    pub async fn open_items(&self) -> Result<Vec<ReviewQueueItem>, ModerationError> {
        self.store.open_items().await
    }

    pub async fn stats(&self) -> Result<QueueStats, ModerationError> {
        self.store.stats().await
    }

    pub async fn history(&self, item_id: u64) -> Result<Vec<ModerationLogEntry>, ModerationError> {
        self.store.logs_for_item(item_id).await
    }

    /// Append an audit entry not tied to a queue transition.
    pub async fn record(&self, entry: ModerationLogEntry) -> Result<(), ModerationError> {
        self.store.append_log(entry).await
    }

    /// Recompute one open item's score with a fresh trust snapshot.
    ///
    /// Writes only score columns. Returns `(old, new)`, or `None` if the item
    /// is gone or closed. Logs an audit entry when the change exceeds
    /// `significant_delta`.
    pub async fn recalculate(
        &self,
        item_id: u64,
        author_trust: Option<TrustLevel>,
        significant_delta: f64,
    ) -> Result<Option<(f64, f64)>, ModerationError> {
        let _item_guard = self.item_locks.lock(item_id).await;

        let Some(mut item) = self.store.get(item_id).await? else {
            return Ok(None);
        };
        if !item.status.is_open() {
            return Ok(None);
        }

        let old_score = item.score;
        if author_trust.is_some() {
            item.author_trust = author_trust;
        }
        self.rescore(&mut item);
        self.store
            .update_score(item.id, item.score, item.author_trust)
            .await?;

        let delta = item.score - old_score;
        if delta.abs() > significant_delta {
            self.store
                .append_log(ModerationLogEntry::for_item(
                    LogAction::ScoreRecalculated,
                    None,
                    &item,
                    "Periodic priority recalculation",
                    json!({ "old_score": old_score, "new_score": item.score, "delta": delta }),
                ))
                .await?;
        }
        Ok(Some((old_score, item.score)))
    }

    /// Delete resolved items older than `retention`. Returns how many went.
    pub async fn cleanup_resolved(
        &self,
        retention: chrono::Duration,
    ) -> Result<u64, ModerationError> {
        let cutoff = Utc::now() - retention;
        let deleted = self.store.delete_resolved_before(cutoff).await?;
        if deleted > 0 {
            self.store
                .append_log(ModerationLogEntry::system(
                    LogAction::Cleanup,
                    None,
                    "Removed resolved items past retention",
                    json!({ "deleted": deleted, "cutoff": cutoff.to_rfc3339() }),
                ))
                .await?;
            tracing::info!(deleted, "Cleaned up resolved queue items");
        }
        let held = self.subject_locks.prune() + self.item_locks.prune();
        tracing::debug!(held, "Pruned idle queue locks");
        Ok(deleted)
    }
}

// ============================================================================
// TESTS
// ============================================================================
