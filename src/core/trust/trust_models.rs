// Trust domain models.
//
// Pure data plus the promotion rules. No storage, no locking.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A user's progression tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    /// New user; every post goes through review.
    Tl0 = 0,
    Tl1 = 1,
    Tl2 = 2,
    Tl3 = 3,
    /// Only reachable by a manual transition.
    Tl4 = 4,
}

impl TrustLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TrustLevel::Tl0),
            1 => Some(TrustLevel::Tl1),
            2 => Some(TrustLevel::Tl2),
            3 => Some(TrustLevel::Tl3),
            4 => Some(TrustLevel::Tl4),
            _ => None,
        }
    }

    /// The tier directly above this one, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TL{}", self.as_u8())
    }
}

/// Something a user did that feeds the trust counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityKind {
    PostRead,
    TopicViewed,
    ReadingTime(Duration),
    PostCreated,
    TopicCreated,
    LikeGiven,
    LikeReceived,
    /// Counted at most once per calendar day (UTC).
    DailyVisit,
}

/// Engagement counters and current tier for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustProfile {
    pub user_id: u64,
    pub level: TrustLevel,
    pub posts_read: u64,
    pub topics_viewed: u64,
    pub reading_time: Duration,
    pub posts_created: u64,
    pub topics_created: u64,
    pub likes_given: u64,
    pub likes_received: u64,
    pub days_visited: u64,
    pub last_visit_date: Option<NaiveDate>,
    pub promoted_at: Option<DateTime<Utc>>,
}

impl TrustProfile {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            level: TrustLevel::Tl0,
            posts_read: 0,
            topics_viewed: 0,
            reading_time: Duration::ZERO,
            posts_created: 0,
            topics_created: 0,
            likes_given: 0,
            likes_received: 0,
            days_visited: 0,
            last_visit_date: None,
            promoted_at: None,
        }
    }

    /// Apply one activity to the counters.
    pub fn record(&mut self, kind: ActivityKind, at: DateTime<Utc>) {
        match kind {
            ActivityKind::PostRead => self.posts_read += 1,
            ActivityKind::TopicViewed => self.topics_viewed += 1,
            ActivityKind::ReadingTime(spent) => self.reading_time += spent,
            ActivityKind::PostCreated => self.posts_created += 1,
            ActivityKind::TopicCreated => self.topics_created += 1,
            ActivityKind::LikeGiven => self.likes_given += 1,
            ActivityKind::LikeReceived => self.likes_received += 1,
            ActivityKind::DailyVisit => {
                let today = at.date_naive();
                if self.last_visit_date != Some(today) {
                    self.days_visited += 1;
                    self.last_visit_date = Some(today);
                }
            }
        }
    }

    /// Move to `new_level` if it is above the current level.
    ///
    /// Returns `false` (and changes nothing) for lower or equal targets.
    pub fn promote(&mut self, new_level: TrustLevel, at: DateTime<Utc>) -> bool {
        if new_level <= self.level {
            return false;
        }
        self.level = new_level;
        self.promoted_at = Some(at);
        true
    }
}

/// Thresholds a profile must meet to reach a tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionRequirements {
    pub posts_read: u64,
    pub reading_time: Duration,
    pub days_visited: u64,
    pub likes_received: u64,
    pub likes_given: u64,
}

impl PromotionRequirements {
    /// Requirements for automatically reaching `target`.
    /// TL0 has none and TL4 is manual-only, so both return `None`.
    pub fn for_level(target: TrustLevel) -> Option<Self> {
        match target {
            TrustLevel::Tl1 => Some(Self {
                posts_read: 10,
                reading_time: Duration::from_secs(10 * 60),
                days_visited: 0,
                likes_received: 0,
                likes_given: 0,
            }),
            TrustLevel::Tl2 => Some(Self {
                posts_read: 100,
                reading_time: Duration::ZERO,
                days_visited: 15,
                likes_received: 1,
                likes_given: 0,
            }),
            TrustLevel::Tl3 => Some(Self {
                posts_read: 500,
                reading_time: Duration::ZERO,
                days_visited: 50,
                likes_received: 10,
                likes_given: 30,
            }),
            TrustLevel::Tl0 | TrustLevel::Tl4 => None,
        }
    }

    pub fn met_by(&self, profile: &TrustProfile) -> bool {
        profile.posts_read >= self.posts_read
            && profile.reading_time >= self.reading_time
            && profile.days_visited >= self.days_visited
            && profile.likes_received >= self.likes_received
            && profile.likes_given >= self.likes_given
    }
}

/// Which tier `profile` has earned directly above its current one.
///
/// Only ever looks one step up, never returns a level at or below the current
/// one, and never returns TL4.
pub fn check_promotion(profile: &TrustProfile) -> Option<TrustLevel> {
    let target = profile.level.next()?;
    let requirements = PromotionRequirements::for_level(target)?;
    requirements.met_by(profile).then_some(target)
}

/// Emitted when a user moves up the ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustPromotion {
    pub user_id: u64,
    pub old_level: TrustLevel,
    pub new_level: TrustLevel,
    pub promoted_at: DateTime<Utc>,
}
