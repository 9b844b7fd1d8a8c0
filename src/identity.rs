//! Current-user scoping.
//!
//! Authentication happens outside this crate; all we need is "who is
//! asking", and a clear failure when nobody is.

use std::sync::Arc;

use crate::model::*;
use crate::schedule::{ScheduleError, ScheduleStore};

pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when the request is anonymous.
    fn current_user_id(&self) -> Option<UserId>;
}

/// Fixed identity, e.g. resolved once per request by the surrounding app.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self(Some(UserId::new(user_id)))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// The schedule operations a signed-in member performs on their own schedule.
pub struct MemberSchedule<I> {
    store: Arc<ScheduleStore>,
    identity: I,
}

impl<I: IdentityProvider> MemberSchedule<I> {
    pub fn new(store: Arc<ScheduleStore>, identity: I) -> Self {
        Self { store, identity }
    }

    fn user(&self) -> Result<UserId, ScheduleError> {
        self.identity
            .current_user_id()
            .ok_or(ScheduleError::Unauthenticated)
    }

    pub async fn add(&self, session_id: SessionId) -> Result<(), ScheduleError> {
        self.store.add_to_schedule(&self.user()?, session_id).await
    }

    pub async fn remove(&self, session_id: SessionId) -> Result<(), ScheduleError> {
        self.store.remove_from_schedule(&self.user()?, session_id).await
    }

    pub async fn toggle(
        &self,
        session_id: SessionId,
        currently_scheduled: bool,
    ) -> Result<bool, ScheduleError> {
        self.store
            .toggle_session(&self.user()?, session_id, currently_scheduled)
            .await
    }

    pub async fn schedule(&self) -> Result<Vec<ScheduledSession>, ScheduleError> {
        self.store.list_schedule(&self.user()?).await
    }

    pub async fn conflicts(&self) -> Result<Vec<ScheduledEntry>, ScheduleError> {
        self.store.list_conflicts(&self.user()?).await
    }

    pub async fn scheduled_ids(&self) -> Result<Vec<SessionId>, ScheduleError> {
        self.store.scheduled_session_ids(&self.user()?).await
    }

    pub async fn summary(&self) -> Result<ScheduleSummary, ScheduleError> {
        self.store.summary(&self.user()?).await
    }
}
