// Trust level tracker - counters in, promotions out.
//
// This is the only place that decides whether a user's content is exempt from
// "new user" review. Profiles are created lazily on first activity and never
// deleted.

use super::trust_models::{
    check_promotion, ActivityKind, TrustLevel, TrustProfile, TrustPromotion,
};
use crate::core::errors::ModerationError;
use crate::core::locks::KeyedLocks;
use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Load a profile. `Ok(None)` for users with no recorded activity.
    async fn get_profile(&self, user_id: u64) -> Result<Option<TrustProfile>, ModerationError>;

    /// Insert or replace a profile.
    async fn save_profile(&self, profile: &TrustProfile) -> Result<(), ModerationError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct TrustLevelTracker<T: TrustStore> {
    store: T,
    /// Serializes load-modify-save per user.
    locks: KeyedLocks<u64>,
}

impl<T: TrustStore> TrustLevelTracker<T> {
    pub fn new(store: T) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn check_promotion(&self, profile: &TrustProfile) -> Option<TrustLevel> {
        check_promotion(profile)
    }

    /// Current level; users without a profile are TL0.
    pub async fn level(&self, user_id: u64) -> Result<TrustLevel, ModerationError> {
        Ok(self
            .store
            .get_profile(user_id)
            .await?
            .map(|p| p.level)
            .unwrap_or(TrustLevel::Tl0))
    }

    pub async fn profile(&self, user_id: u64) -> Result<Option<TrustProfile>, ModerationError> {
        self.store.get_profile(user_id).await
    }

    /// Bump the counter for `kind`, creating the profile if needed.
    pub async fn record_activity(
        &self,
        user_id: u64,
        kind: ActivityKind,
    ) -> Result<TrustProfile, ModerationError> {
        let _guard = self.locks.lock(user_id).await;

        let mut profile = self
            .store
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| TrustProfile::new(user_id));
        profile.record(kind, Utc::now());
        self.store.save_profile(&profile).await?;

        Ok(profile)
    }

    /// Move a user up to `new_level`.
    ///
    /// Lower or equal targets are a no-op (`Ok(None)`), not an error.
    pub async fn promote(
        &self,
        user_id: u64,
        new_level: TrustLevel,
    ) -> Result<Option<TrustPromotion>, ModerationError> {
        let _guard = self.locks.lock(user_id).await;

        let mut profile = self
            .store
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| TrustProfile::new(user_id));
        self.apply_promotion(&mut profile, new_level).await
    }

    /// Run `check_promotion` and apply whatever it returns.
    pub async fn evaluate(&self, user_id: u64) -> Result<Option<TrustPromotion>, ModerationError> {
        let _guard = self.locks.lock(user_id).await;

        let Some(mut profile) = self.store.get_profile(user_id).await? else {
            return Ok(None);
        };
        match check_promotion(&profile) {
            Some(target) => self.apply_promotion(&mut profile, target).await,
            None => Ok(None),
        }
    }

    /// Manual transition: the only way to reach TL4, and the only way down.
    pub async fn set_level(
        &self,
        user_id: u64,
        level: TrustLevel,
    ) -> Result<TrustProfile, ModerationError> {
        let _guard = self.locks.lock(user_id).await;

        let mut profile = self
            .store
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| TrustProfile::new(user_id));
        let old_level = profile.level;
        profile.level = level;
        profile.promoted_at = Some(Utc::now());
        self.store.save_profile(&profile).await?;

        tracing::info!(
            user_id,
            old_level = %old_level,
            new_level = %level,
            "Trust level set manually"
        );
        Ok(profile)
    }

    async fn apply_promotion(
        &self,
        profile: &mut TrustProfile,
        new_level: TrustLevel,
    ) -> Result<Option<TrustPromotion>, ModerationError> {
        let old_level = profile.level;
        let now = Utc::now();
        if !profile.promote(new_level, now) {
            return Ok(None);
        }
        self.store.save_profile(profile).await?;

        tracing::info!(
            user_id = profile.user_id,
            old_level = %old_level,
            new_level = %new_level,
            "User promoted"
        );
        Ok(Some(TrustPromotion {
            user_id: profile.user_id,
            old_level,
            new_level,
            promoted_at: now,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::time::Duration;

    struct MockTrustStore {
        profiles: DashMap<u64, TrustProfile>,
    }

    impl MockTrustStore {
        fn new() -> Self {
            Self {
                profiles: DashMap::new(),
            }
        }
    }

    #[async_trait]
    impl TrustStore for MockTrustStore {
        async fn get_profile(&self, user_id: u64) -> Result<Option<TrustProfile>, ModerationError> {
            Ok(self.profiles.get(&user_id).map(|p| p.clone()))
        }

        async fn save_profile(&self, profile: &TrustProfile) -> Result<(), ModerationError> {
            self.profiles.insert(profile.user_id, profile.clone());
            Ok(())
        }
    }

    fn tl1_ready() -> TrustProfile {
        let mut profile = TrustProfile::new(5);
        profile.posts_read = 10;
        profile.reading_time = Duration::from_secs(11 * 60);
        profile
    }

    #[test]
    fn fresh_user_gets_nothing() {
        let profile = TrustProfile::new(1);
        assert_eq!(check_promotion(&profile), None);
    }

    #[test]
    fn tl1_needs_reading_time_too() {
        let mut profile = TrustProfile::new(1);
        profile.posts_read = 50;
        profile.reading_time = Duration::from_secs(9 * 60);
        assert_eq!(check_promotion(&profile), None);
    }

    #[test]
    fn promotion_only_looks_one_step_up() {
        // Counters good enough for TL3, but we're at TL0.
        let mut profile = TrustProfile::new(1);
        profile.posts_read = 1000;
        profile.reading_time = Duration::from_secs(3600);
        profile.days_visited = 100;
        profile.likes_received = 50;
        profile.likes_given = 50;

        assert_eq!(check_promotion(&profile), Some(TrustLevel::Tl1));

        profile.level = TrustLevel::Tl3;
        assert_eq!(check_promotion(&profile), None);
    }

    #[test]
    fn tl2_and_tl3_thresholds() {
        let mut profile = TrustProfile::new(1);
        profile.level = TrustLevel::Tl1;
        profile.days_visited = 15;
        profile.posts_read = 100;
        assert_eq!(
            check_promotion(&profile),
            None,
            "TL2 needs at least one like received"
        );
        profile.likes_received = 1;
        assert_eq!(check_promotion(&profile), Some(TrustLevel::Tl2));

        profile.level = TrustLevel::Tl2;
        profile.days_visited = 50;
        profile.posts_read = 500;
        profile.likes_received = 10;
        profile.likes_given = 29;
        assert_eq!(check_promotion(&profile), None);
        profile.likes_given = 30;
        assert_eq!(check_promotion(&profile), Some(TrustLevel::Tl3));
    }

    #[tokio::test]
    async fn scenario_tl0_reader_is_promoted_once() {
        let store = MockTrustStore::new();
        store.save_profile(&tl1_ready()).await.unwrap();
        let tracker = TrustLevelTracker::new(store);

        let profile = tracker.profile(5).await.unwrap().unwrap();
        assert_eq!(tracker.check_promotion(&profile), Some(TrustLevel::Tl1));

        let promotion = tracker.promote(5, TrustLevel::Tl1).await.unwrap().unwrap();
        assert_eq!(promotion.old_level, TrustLevel::Tl0);
        assert_eq!(promotion.new_level, TrustLevel::Tl1);

        let profile = tracker.profile(5).await.unwrap().unwrap();
        assert_eq!(check_promotion(&profile), None);
        assert!(tracker.evaluate(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn promote_to_same_level_is_a_noop() {
        let tracker = TrustLevelTracker::new(MockTrustStore::new());
        tracker.promote(1, TrustLevel::Tl2).await.unwrap();

        assert!(tracker.promote(1, TrustLevel::Tl2).await.unwrap().is_none());
        assert!(tracker.promote(1, TrustLevel::Tl1).await.unwrap().is_none());
        assert_eq!(tracker.level(1).await.unwrap(), TrustLevel::Tl2);
    }

    #[tokio::test]
    async fn record_activity_creates_profile_lazily() {
        let tracker = TrustLevelTracker::new(MockTrustStore::new());
        assert_eq!(tracker.level(9).await.unwrap(), TrustLevel::Tl0);
        assert!(tracker.profile(9).await.unwrap().is_none());

        for _ in 0..10 {
            tracker.record_activity(9, ActivityKind::PostRead).await.unwrap();
        }
        tracker
            .record_activity(9, ActivityKind::ReadingTime(Duration::from_secs(600)))
            .await
            .unwrap();

        let promotion = tracker.evaluate(9).await.unwrap().unwrap();
        assert_eq!(promotion.new_level, TrustLevel::Tl1);
    }

    #[tokio::test]
    async fn concurrent_activity_is_not_lost() {
        use std::sync::Arc;

        let tracker = Arc::new(TrustLevelTracker::new(MockTrustStore::new()));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.record_activity(3, ActivityKind::LikeGiven).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let profile = tracker.profile(3).await.unwrap().unwrap();
        assert_eq!(profile.likes_given, 20);
    }

    #[tokio::test]
    async fn tl4_only_via_manual_set() {
        let tracker = TrustLevelTracker::new(MockTrustStore::new());
        tracker.set_level(2, TrustLevel::Tl3).await.unwrap();
        assert!(tracker.evaluate(2).await.unwrap().is_none());

        tracker.set_level(2, TrustLevel::Tl4).await.unwrap();
        assert_eq!(tracker.level(2).await.unwrap(), TrustLevel::Tl4);
    }
}
