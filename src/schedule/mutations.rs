use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::limits::MAX_SCHEDULED_PER_USER;
use crate::model::*;
use crate::observability::{Op, CONFLICTS_DETECTED_TOTAL};

use super::conflict::{recompute_day, validate_session, validate_user};
use super::{record, ScheduleError, ScheduleStore};

impl ScheduleStore {
    /// Put `session_id` on the user's schedule. Adding a session that is
    /// already there succeeds without writing anything.
    pub async fn add_to_schedule(
        &self,
        user_id: &UserId,
        session_id: SessionId,
    ) -> Result<(), ScheduleError> {
        let started = Instant::now();
        let result = self.add_inner(user_id, session_id).await;
        record(Op::Add, started, &result);
        result
    }

    async fn add_inner(&self, user_id: &UserId, session_id: SessionId) -> Result<(), ScheduleError> {
        validate_user(user_id)?;

        let _shared = self.gate.read().await;
        let (us, mut guard) = self.lock_user_for_write(user_id).await;
        let result = self.add_locked(&mut guard, session_id).await;
        if result.is_err() {
            self.evict_if_empty(&us, &guard);
        }
        drop(guard);

        if let Some((event, date)) = result? {
            self.notify.send(&event);
            info!(user = %user_id, session = %session_id, %date, "session scheduled");
        }
        Ok(())
    }

    /// The catalog lookup happens under the user's write guard: a purge
    /// that follows a catalog removal has to wait for this guard, so it
    /// always sees what we insert.
    async fn add_locked(
        &self,
        guard: &mut UserSchedule,
        session_id: SessionId,
    ) -> Result<Option<(Event, NaiveDate)>, ScheduleError> {
        let session = self.catalog.get_session(&session_id).await?;
        validate_session(&session)?;
        if guard.contains(&session_id) {
            debug!(user = %guard.user_id, session = %session_id, "already scheduled");
            return Ok(None);
        }
        if guard.len() >= MAX_SCHEDULED_PER_USER {
            return Err(ScheduleError::LimitExceeded("too many scheduled sessions"));
        }

        let event = Event::SessionScheduled {
            user_id: guard.user_id.clone(),
            session_id,
        };
        self.storage.append(&event).await?;

        let date = session.date;
        guard.insert_slot(session);
        let newly_conflicting = recompute_day(guard.day_mut(date));
        if newly_conflicting > 0 {
            metrics::counter!(CONFLICTS_DETECTED_TOTAL).increment(newly_conflicting as u64);
        }
        Ok(Some((event, date)))
    }

    /// Take `session_id` off the user's schedule. Removing something that
    /// is not scheduled succeeds without writing anything.
    pub async fn remove_from_schedule(
        &self,
        user_id: &UserId,
        session_id: SessionId,
    ) -> Result<(), ScheduleError> {
        let started = Instant::now();
        let result = self.remove_inner(user_id, session_id).await;
        record(Op::Remove, started, &result);
        result
    }

    async fn remove_inner(
        &self,
        user_id: &UserId,
        session_id: SessionId,
    ) -> Result<(), ScheduleError> {
        validate_user(user_id)?;
        let _shared = self.gate.read().await;
        let Some(us) = self.user_schedule(user_id) else {
            return Ok(());
        };
        let mut guard = us.write().await;
        let Some(date) = guard.date_of(&session_id) else {
            debug!(user = %user_id, session = %session_id, "not scheduled, nothing to remove");
            return Ok(());
        };

        let event = Event::SessionUnscheduled {
            user_id: user_id.clone(),
            session_id,
        };
        self.storage.append(&event).await?;

        guard.remove_slot(&session_id);
        recompute_day(guard.day_mut(date));
        self.evict_if_empty(&us, &guard);
        drop(guard);

        self.notify.send(&event);
        info!(user = %user_id, session = %session_id, %date, "session unscheduled");
        Ok(())
    }

    /// Flip a session's scheduled state: remove it when `currently_scheduled`,
    /// add it otherwise. Returns the new state.
    pub async fn toggle_session(
        &self,
        user_id: &UserId,
        session_id: SessionId,
        currently_scheduled: bool,
    ) -> Result<bool, ScheduleError> {
        if currently_scheduled {
            self.remove_from_schedule(user_id, session_id).await?;
            Ok(false)
        } else {
            self.add_to_schedule(user_id, session_id).await?;
            Ok(true)
        }
    }

    /// Remove a deleted catalog session from every schedule that holds it.
    /// Returns the number of schedules touched.
    ///
    /// Idempotent: if a storage failure stops it partway, calling it again
    /// finishes the job.
    pub async fn purge_session(&self, session_id: SessionId) -> Result<usize, ScheduleError> {
        let started = Instant::now();
        let result = self.purge_inner(session_id).await;
        record(Op::Purge, started, &result);
        result
    }

    async fn purge_inner(&self, session_id: SessionId) -> Result<usize, ScheduleError> {
        let _shared = self.gate.read().await;
        let mut touched = 0usize;
        for us in self.all_user_schedules() {
            let mut guard = us.write().await;
            let Some(date) = guard.date_of(&session_id) else {
                continue;
            };
            let event = Event::SessionUnscheduled {
                user_id: guard.user_id.clone(),
                session_id,
            };
            self.storage.append(&event).await?;
            guard.remove_slot(&session_id);
            recompute_day(guard.day_mut(date));
            self.evict_if_empty(&us, &guard);
            drop(guard);
            self.notify.send(&event);
            touched += 1;
        }
        info!(session = %session_id, touched, "purged session from schedules");
        Ok(touched)
    }
}
