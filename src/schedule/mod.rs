mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::ScheduleError;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};

use crate::catalog::{CatalogError, SessionCatalog};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{Op, SCHEDULE_OPS_TOTAL, SCHEDULE_OP_DURATION_SECONDS, USERS_ACTIVE};
use crate::storage::ScheduleStorage;

pub type SharedUserSchedule = Arc<RwLock<UserSchedule>>;

/// Owns every user's schedule and keeps conflict flags correct.
///
/// Each user's schedule sits behind its own `RwLock`: a mutation holds the
/// write guard across catalog lookup, persist, apply and recompute, so two
/// adds for the same user can never both see a stale day, and a session
/// purged from the catalog cannot slip back in behind the purge. Users with
/// an empty schedule are evicted. Different users never contend.
pub struct ScheduleStore {
    users: DashMap<UserId, SharedUserSchedule>,
    storage: Arc<dyn ScheduleStorage>,
    catalog: Arc<dyn SessionCatalog>,
    pub notify: Arc<NotifyHub>,
    /// Mutations hold it shared; compaction holds it exclusively so no
    /// append can slip between the snapshot and the rewrite.
    gate: RwLock<()>,
}

impl ScheduleStore {
    /// Build the store from whatever `storage` already holds.
    ///
    /// Sessions the catalog no longer knows are dropped from the replayed
    /// schedules and the removal is appended to storage.
    pub async fn open(
        storage: Arc<dyn ScheduleStorage>,
        catalog: Arc<dyn SessionCatalog>,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, ScheduleError> {
        let events = storage.load().await?;

        let mut scheduled: HashMap<UserId, HashSet<SessionId>> = HashMap::new();
        for event in &events {
            match event {
                Event::SessionScheduled { user_id, session_id } => {
                    scheduled.entry(user_id.clone()).or_default().insert(*session_id);
                }
                Event::SessionUnscheduled { user_id, session_id } => {
                    if let Some(ids) = scheduled.get_mut(user_id) {
                        ids.remove(session_id);
                    }
                }
            }
        }

        let store = Self {
            users: DashMap::new(),
            storage,
            catalog,
            notify,
            gate: RwLock::new(()),
        };

        let mut dropped = 0usize;
        for (user_id, ids) in scheduled {
            let mut us = UserSchedule::new(user_id.clone());
            for session_id in ids {
                match store.catalog.get_session(&session_id).await {
                    Ok(session) => {
                        if let Err(e) = conflict::validate_session(&session) {
                            warn!(user = %user_id, session = %session_id, "skipping schedule entry: {e}");
                            continue;
                        }
                        us.insert_slot(session);
                    }
                    Err(CatalogError::NotFound(_)) => {
                        warn!(user = %user_id, session = %session_id, "dropping schedule entry for deleted session");
                        store
                            .storage
                            .append(&Event::SessionUnscheduled {
                                user_id: user_id.clone(),
                                session_id,
                            })
                            .await?;
                        dropped += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            for date in us.dates() {
                conflict::recompute_day(us.day_mut(date));
            }
            if !us.is_empty() {
                store.users.insert(user_id, Arc::new(RwLock::new(us)));
            }
        }

        metrics::gauge!(USERS_ACTIVE).set(store.users.len() as f64);
        info!(
            events = events.len(),
            users = store.users.len(),
            dropped,
            "replayed schedules"
        );
        Ok(store)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub(super) fn user_schedule(&self, user_id: &UserId) -> Option<SharedUserSchedule> {
        self.users.get(user_id).map(|e| e.value().clone())
    }

    pub(super) fn user_schedule_or_create(&self, user_id: &UserId) -> SharedUserSchedule {
        if let Some(existing) = self.user_schedule(user_id) {
            return existing;
        }
        let shared = self
            .users
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(UserSchedule::new(user_id.clone()))))
            .value()
            .clone();
        metrics::gauge!(USERS_ACTIVE).set(self.users.len() as f64);
        shared
    }

    /// Write-lock the user's live schedule, creating it if needed.
    ///
    /// A schedule evicted while we waited for its lock is detached from the
    /// map; retry against the current entry so nothing lands in an orphan.
    pub(super) async fn lock_user_for_write(
        &self,
        user_id: &UserId,
    ) -> (SharedUserSchedule, OwnedRwLockWriteGuard<UserSchedule>) {
        loop {
            let us = self.user_schedule_or_create(user_id);
            let guard = us.clone().write_owned().await;
            let live = self
                .users
                .get(user_id)
                .is_some_and(|e| Arc::ptr_eq(e.value(), &us));
            if live {
                return (us, guard);
            }
        }
    }

    /// Drop the user's map entry once their schedule is empty. Must be called
    /// with the schedule's write guard held.
    pub(super) fn evict_if_empty(&self, us: &SharedUserSchedule, guard: &UserSchedule) {
        if !guard.is_empty() {
            return;
        }
        if self
            .users
            .remove_if(&guard.user_id, |_, v| Arc::ptr_eq(v, us))
            .is_some()
        {
            metrics::gauge!(USERS_ACTIVE).set(self.users.len() as f64);
        }
    }

    pub(super) fn all_user_schedules(&self) -> Vec<SharedUserSchedule> {
        let mut all: Vec<(UserId, SharedUserSchedule)> = self
            .users
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        // Stable lock order for anything that walks every user.
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.into_iter().map(|(_, s)| s).collect()
    }

    /// Rewrite storage with one `SessionScheduled` per live entry.
    pub async fn compact(&self) -> Result<(), ScheduleError> {
        let _exclusive = self.gate.write().await;
        let mut events = Vec::new();
        for shared in self.all_user_schedules() {
            let guard = shared.read().await;
            events.extend(guard.slots.iter().map(|slot| Event::SessionScheduled {
                user_id: guard.user_id.clone(),
                session_id: slot.session.id,
            }));
        }
        let count = events.len();
        let result = self.storage.compact(events).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => status)
            .increment(1);
        result?;
        info!(entries = count, "compacted schedule storage");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.storage.appends_since_compact().await
    }
}

fn record<T>(op: Op, started: Instant, result: &Result<T, ScheduleError>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(SCHEDULE_OPS_TOTAL, "op" => op.label(), "status" => status).increment(1);
    metrics::histogram!(SCHEDULE_OP_DURATION_SECONDS, "op" => op.label())
        .record(started.elapsed().as_secs_f64());
}
