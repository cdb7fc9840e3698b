//! Conference and profile lookup.
//!
//! Profile storage lives outside the scheduler; this is the seam it is
//! reached through. Callers act as a [`UserId`] and are resolved to a
//! per-conference [`Profile`] here.

use crate::errors::SchedulerError;
use crate::models::{Conference, Profile};
use async_trait::async_trait;
use common::types::{ConferenceId, ProfileId, UserId};
use thiserror::Error;

/// Failure reaching the profile store.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Directory returned malformed data: {0}")]
    Malformed(String),
}

impl From<DirectoryError> for SchedulerError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(reason) => SchedulerError::Database(reason),
            DirectoryError::Malformed(_) => SchedulerError::Internal,
        }
    }
}

/// Resolves conferences and participant profiles.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Conference by id.
    async fn find_conference(
        &self,
        conference_id: ConferenceId,
    ) -> Result<Option<Conference>, DirectoryError>;

    /// The profile `user_id` holds in `conference_id`, active or not.
    async fn find_profile_by_user(
        &self,
        conference_id: ConferenceId,
        user_id: UserId,
    ) -> Result<Option<Profile>, DirectoryError>;

    /// Profile by id.
    async fn find_profile(&self, profile_id: ProfileId) -> Result<Option<Profile>, DirectoryError>;
}

/// In-memory directory for tests and local runs.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    /// Directory over plain maps.
    #[derive(Debug, Default)]
    pub struct InMemoryDirectory {
        conferences: RwLock<HashMap<ConferenceId, Conference>>,
        profiles: RwLock<HashMap<ProfileId, Profile>>,
        unavailable: AtomicBool,
    }

    impl InMemoryDirectory {
        /// Create an empty directory.
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a conference.
        pub fn add_conference(&self, conference: Conference) {
            if let Ok(mut conferences) = self.conferences.write() {
                conferences.insert(conference.id, conference);
            }
        }

        /// Register a profile.
        pub fn add_profile(&self, profile: Profile) {
            if let Ok(mut profiles) = self.profiles.write() {
                profiles.insert(profile.id, profile);
            }
        }

        /// Flip a profile's active flag.
        pub fn set_active(&self, profile_id: ProfileId, is_active: bool) {
            if let Ok(mut profiles) = self.profiles.write() {
                if let Some(profile) = profiles.get_mut(&profile_id) {
                    profile.is_active = is_active;
                }
            }
        }

        /// Make every lookup fail with `Unavailable`.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), DirectoryError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(DirectoryError::Unavailable(
                    "Mock directory offline".to_string(),
                ));
            }
            Ok(())
        }

        fn poisoned() -> DirectoryError {
            DirectoryError::Malformed("lock poisoned".to_string())
        }
    }

    #[async_trait]
    impl ParticipantDirectory for InMemoryDirectory {
        async fn find_conference(
            &self,
            conference_id: ConferenceId,
        ) -> Result<Option<Conference>, DirectoryError> {
            self.check_available()?;
            let conferences = self.conferences.read().map_err(|_| Self::poisoned())?;
            Ok(conferences.get(&conference_id).cloned())
        }

        async fn find_profile_by_user(
            &self,
            conference_id: ConferenceId,
            user_id: UserId,
        ) -> Result<Option<Profile>, DirectoryError> {
            self.check_available()?;
            let profiles = self.profiles.read().map_err(|_| Self::poisoned())?;
            Ok(profiles
                .values()
                .find(|p| p.conference_id == conference_id && p.user_id == user_id)
                .cloned())
        }

        async fn find_profile(
            &self,
            profile_id: ProfileId,
        ) -> Result<Option<Profile>, DirectoryError> {
            self.check_available()?;
            let profiles = self.profiles.read().map_err(|_| Self::poisoned())?;
            Ok(profiles.get(&profile_id).cloned())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::InMemoryDirectory;
    use super::*;

    #[tokio::test]
    async fn test_profile_lookup_is_scoped_to_conference() {
        let directory = InMemoryDirectory::new();
        let conference = ConferenceId::new();
        let user = UserId::new();
        let profile = Profile {
            id: ProfileId::new(),
            conference_id: conference,
            user_id: user,
            display_name: "Ada".to_string(),
            is_active: true,
        };
        directory.add_profile(profile.clone());

        let found = directory.find_profile_by_user(conference, user).await.unwrap();
        assert_eq!(found, Some(profile.clone()));

        let elsewhere = directory
            .find_profile_by_user(ConferenceId::new(), user)
            .await
            .unwrap();
        assert!(elsewhere.is_none());

        directory.set_active(profile.id, false);
        let found = directory.find_profile(profile.id).await.unwrap().unwrap();
        assert!(!found.is_active);
    }

    #[tokio::test]
    async fn test_unavailable_maps_to_database_error() {
        let directory = InMemoryDirectory::new();
        directory.set_unavailable(true);

        let err = directory
            .find_conference(ConferenceId::new())
            .await
            .unwrap_err();
        let mapped: SchedulerError = err.into();
        assert!(matches!(mapped, SchedulerError::Database(_)));
    }
}
