//! Meeting quota seam.
//!
//! Limits are owned by whoever manages conferences; the scheduler only asks.

use crate::errors::{QuotaScope, SchedulerError};
use async_trait::async_trait;
use common::types::{ConferenceId, UserId};

/// Allow/deny answer with the counts behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Whether one more meeting may be created.
    pub allowed: bool,
    /// Meetings counted against the limit.
    pub current: u32,
    /// Configured limit.
    pub limit: u32,
}

impl QuotaDecision {
    /// Decision derived from a count and a limit.
    pub fn from_counts(current: u32, limit: u32) -> Self {
        Self {
            allowed: current < limit,
            current,
            limit,
        }
    }

    /// Turn a denial into `QuotaExceeded` for `scope`.
    pub fn enforce(self, scope: QuotaScope) -> Result<(), SchedulerError> {
        if self.allowed {
            Ok(())
        } else {
            Err(SchedulerError::QuotaExceeded {
                scope,
                current: self.current,
                limit: self.limit,
            })
        }
    }
}

/// Quota checks consulted before a meeting request is stored.
#[async_trait]
pub trait QuotaChecker: Send + Sync {
    /// Conference-wide limit.
    async fn can_create_meeting(
        &self,
        conference_id: ConferenceId,
    ) -> Result<QuotaDecision, SchedulerError>;

    /// Per-user limit inside a conference.
    async fn can_user_create_meeting(
        &self,
        conference_id: ConferenceId,
        user_id: UserId,
    ) -> Result<QuotaDecision, SchedulerError>;
}

/// Mock quota checkers for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Quota checker returning fixed decisions.
    #[derive(Debug)]
    pub struct MockQuotaChecker {
        conference: Mutex<QuotaDecision>,
        user: Mutex<QuotaDecision>,
        call_count: AtomicUsize,
    }

    impl MockQuotaChecker {
        /// Allow everything.
        pub fn unlimited() -> Self {
            let open = QuotaDecision::from_counts(0, u32::MAX);
            Self {
                conference: Mutex::new(open),
                user: Mutex::new(open),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Replace the conference-wide decision.
        pub fn set_conference(&self, decision: QuotaDecision) {
            if let Ok(mut slot) = self.conference.lock() {
                *slot = decision;
            }
        }

        /// Replace the per-user decision.
        pub fn set_user(&self, decision: QuotaDecision) {
            if let Ok(mut slot) = self.user.lock() {
                *slot = decision;
            }
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        fn read(slot: &Mutex<QuotaDecision>) -> Result<QuotaDecision, SchedulerError> {
            slot.lock().map(|d| *d).map_err(|_| SchedulerError::Internal)
        }
    }

    impl Default for MockQuotaChecker {
        fn default() -> Self {
            Self::unlimited()
        }
    }

    #[async_trait]
    impl QuotaChecker for MockQuotaChecker {
        async fn can_create_meeting(
            &self,
            _conference_id: ConferenceId,
        ) -> Result<QuotaDecision, SchedulerError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Self::read(&self.conference)
        }

        async fn can_user_create_meeting(
            &self,
            _conference_id: ConferenceId,
            _user_id: UserId,
        ) -> Result<QuotaDecision, SchedulerError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Self::read(&self.user)
        }
    }
}
