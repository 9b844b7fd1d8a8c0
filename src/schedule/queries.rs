use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::model::*;

use super::conflict::{conflicting_with, validate_session, validate_user};
use super::{ScheduleError, ScheduleStore};

impl ScheduleStore {
    /// The user's sessions with conflict flags, ordered by date then start time.
    pub async fn list_schedule(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ScheduledSession>, ScheduleError> {
        validate_user(user_id)?;
        let Some(us) = self.user_schedule(user_id) else {
            return Ok(Vec::new());
        };
        let guard = us.read().await;
        Ok(guard.slots.clone())
    }

    pub async fn list_conflicts(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ScheduledEntry>, ScheduleError> {
        Ok(self
            .list_schedule(user_id)
            .await?
            .into_iter()
            .filter(|slot| slot.has_conflict)
            .map(|slot| ScheduledEntry {
                user_id: user_id.clone(),
                session_id: slot.session.id,
                has_conflict: true,
            })
            .collect())
    }

    pub async fn scheduled_session_ids(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<SessionId>, ScheduleError> {
        Ok(self
            .list_schedule(user_id)
            .await?
            .into_iter()
            .map(|slot| slot.session.id)
            .collect())
    }

    pub async fn is_scheduled(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<bool, ScheduleError> {
        validate_user(user_id)?;
        let Some(us) = self.user_schedule(user_id) else {
            return Ok(false);
        };
        let guard = us.read().await;
        Ok(guard.contains(session_id))
    }

    /// Day view: scheduled sessions grouped by date.
    pub async fn schedule_by_date(
        &self,
        user_id: &UserId,
    ) -> Result<BTreeMap<NaiveDate, Vec<ScheduledSession>>, ScheduleError> {
        let mut days: BTreeMap<NaiveDate, Vec<ScheduledSession>> = BTreeMap::new();
        for slot in self.list_schedule(user_id).await? {
            days.entry(slot.session.date).or_default().push(slot);
        }
        Ok(days)
    }

    pub async fn summary(&self, user_id: &UserId) -> Result<ScheduleSummary, ScheduleError> {
        let slots = self.list_schedule(user_id).await?;
        let days: BTreeSet<NaiveDate> = slots.iter().map(|s| s.session.date).collect();
        let tracks: BTreeSet<&str> = slots
            .iter()
            .filter_map(|s| s.session.track.as_deref())
            .collect();
        Ok(ScheduleSummary {
            total_sessions: slots.len(),
            conference_days: days.len(),
            distinct_tracks: tracks.len(),
            conflicts: slots.iter().filter(|s| s.has_conflict).count(),
        })
    }

    /// Which already-scheduled sessions would overlap `session_id` if it were added.
    pub async fn preview_conflicts(
        &self,
        user_id: &UserId,
        session_id: SessionId,
    ) -> Result<Vec<SessionId>, ScheduleError> {
        validate_user(user_id)?;
        let candidate = self.catalog.get_session(&session_id).await?;
        validate_session(&candidate)?;
        let Some(us) = self.user_schedule(user_id) else {
            return Ok(Vec::new());
        };
        let guard = us.read().await;
        Ok(conflicting_with(guard.day(candidate.date), &candidate))
    }
}
