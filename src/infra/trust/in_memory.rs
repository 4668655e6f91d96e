// In-memory TrustStore, used by tests and single-process deployments that
// don't need profiles to survive a restart.

use crate::core::errors::ModerationError;
use crate::core::trust::{TrustProfile, TrustStore};
use async_trait::async_trait;
use dashmap::DashMap;

/// Profiles keyed by user id.
///
/// The tracker serializes writes per user, so a plain insert is enough here.
pub struct InMemoryTrustStore {
    profiles: DashMap<u64, TrustProfile>,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for InMemoryTrustStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrustStore for InMemoryTrustStore {
    async fn get_profile(&self, user_id: u64) -> Result<Option<TrustProfile>, ModerationError> {
        Ok(self.profiles.get(&user_id).map(|p| p.value().clone()))
    }

    async fn save_profile(&self, profile: &TrustProfile) -> Result<(), ModerationError> {
        self.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }
}
