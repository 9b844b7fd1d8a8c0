use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::{CatalogError, InMemoryCatalog};
use crate::compactor;
use crate::config::AgendaConfig;
use crate::identity::{IdentityProvider, MemberSchedule};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::schedule::{ScheduleError, ScheduleStore};
use crate::storage::{MemoryStorage, ScheduleStorage, WalStorage};

#[derive(Debug)]
pub enum StartupError {
    Io(std::io::Error),
    Catalog(CatalogError),
    Schedule(ScheduleError),
    Metrics(String),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Io(e) => write!(f, "I/O error: {e}"),
            StartupError::Catalog(e) => write!(f, "{e}"),
            StartupError::Schedule(e) => write!(f, "{e}"),
            StartupError::Metrics(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<std::io::Error> for StartupError {
    fn from(e: std::io::Error) -> Self {
        StartupError::Io(e)
    }
}

impl From<CatalogError> for StartupError {
    fn from(e: CatalogError) -> Self {
        StartupError::Catalog(e)
    }
}

impl From<ScheduleError> for StartupError {
    fn from(e: ScheduleError) -> Self {
        StartupError::Schedule(e)
    }
}

/// Catalog, schedule store and background compactor wired together.
pub struct Agenda {
    pub catalog: Arc<InMemoryCatalog>,
    pub schedule: Arc<ScheduleStore>,
    compactor: Option<JoinHandle<()>>,
}

impl Agenda {
    /// Must be called inside a tokio runtime.
    pub async fn open(config: &AgendaConfig) -> Result<Self, StartupError> {
        observability::init(config.metrics_port).map_err(StartupError::Metrics)?;

        let catalog = Arc::new(match &config.catalog_path {
            Some(path) => InMemoryCatalog::load_json(path)?,
            None => InMemoryCatalog::new(),
        });

        let (storage, durable): (Arc<dyn ScheduleStorage>, bool) = match config.wal_path() {
            Some(path) => {
                if let Some(dir) = &config.data_dir {
                    std::fs::create_dir_all(dir)?;
                }
                (Arc::new(WalStorage::open(&path)?), true)
            }
            None => (Arc::new(MemoryStorage::new()), false),
        };

        let schedule = Arc::new(
            ScheduleStore::open(storage, catalog.clone(), Arc::new(NotifyHub::new())).await?,
        );

        let compactor = durable.then(|| {
            tokio::spawn(compactor::run_compactor(
                schedule.clone(),
                config.compact_threshold,
                config.compact_interval,
            ))
        });

        info!(
            sessions = catalog.session_count(),
            users = schedule.user_count(),
            durable,
            "agenda ready"
        );
        let mut agenda = Self::from_parts(catalog, schedule);
        agenda.compactor = compactor;
        Ok(agenda)
    }

    /// Assemble from an existing catalog and store. No background compaction.
    pub fn from_parts(catalog: Arc<InMemoryCatalog>, schedule: Arc<ScheduleStore>) -> Self {
        Self {
            catalog,
            schedule,
            compactor: None,
        }
    }

    /// Schedule operations scoped to whoever `identity` says is signed in.
    pub fn member<I: IdentityProvider>(&self, identity: I) -> MemberSchedule<I> {
        MemberSchedule::new(self.schedule.clone(), identity)
    }

    /// Organizer action: delete a session and cascade it out of every schedule.
    /// Returns the number of schedules touched.
    ///
    /// The catalog entry goes first so no new add can pick the session up.
    /// If the cascade fails partway, calling this again finishes it; only a
    /// session that is neither in the catalog nor on any schedule is
    /// `NotFound`.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<usize, ScheduleError> {
        let removed = match self.catalog.remove_session(&session_id) {
            Ok(_) => true,
            Err(CatalogError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        let touched = self.schedule.purge_session(session_id).await?;
        if !removed && touched == 0 {
            return Err(ScheduleError::NotFound(session_id));
        }
        Ok(touched)
    }

    /// Stop background work.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.compactor.take() {
            handle.abort();
        }
    }
}

impl Drop for Agenda {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ulid::Ulid;

    /// Accepts `budget` appends, then fails until the budget is raised.
    struct FlakyStorage {
        inner: MemoryStorage,
        budget: AtomicUsize,
    }

    impl FlakyStorage {
        fn new(budget: usize) -> Self {
            Self {
                inner: MemoryStorage::new(),
                budget: AtomicUsize::new(budget),
            }
        }
    }

    #[async_trait]
    impl ScheduleStorage for FlakyStorage {
        async fn load(&self) -> Result<Vec<Event>, StorageError> {
            self.inner.load().await
        }

        async fn append(&self, event: &Event) -> Result<(), StorageError> {
            self.budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map_err(|_| StorageError::Unavailable("down".into()))?;
            self.inner.append(event).await
        }

        async fn compact(&self, events: Vec<Event>) -> Result<(), StorageError> {
            self.inner.compact(events).await
        }

        async fn appends_since_compact(&self) -> u64 {
            self.inner.appends_since_compact().await
        }
    }

    fn session(conf: ConferenceId, start: u32, end: u32) -> Session {
        Session::new(
            Ulid::new(),
            conf,
            "Talk",
            NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
            NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn delete_session_retry_finishes_partial_cascade() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let conf = Ulid::new();
        catalog.create_conference(Conference::new(conf, "Conf")).unwrap();
        let doomed = session(conf, 9, 10);
        let doomed_id = doomed.id;
        catalog.add_session(doomed).unwrap();

        // Two adds succeed, then only one more append is allowed.
        let storage = Arc::new(FlakyStorage::new(3));
        let store = Arc::new(
            ScheduleStore::open(storage.clone(), catalog.clone(), Arc::new(NotifyHub::new()))
                .await
                .unwrap(),
        );
        let agenda = Agenda::from_parts(catalog.clone(), store.clone());
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        store.add_to_schedule(&alice, doomed_id).await.unwrap();
        store.add_to_schedule(&bob, doomed_id).await.unwrap();

        let err = agenda.delete_session(doomed_id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Storage(StorageError::Unavailable(_))));
        assert!(!store.is_scheduled(&alice, &doomed_id).await.unwrap());
        assert!(store.is_scheduled(&bob, &doomed_id).await.unwrap());
        assert_eq!(catalog.session_count(), 0);

        storage.budget.store(10, Ordering::SeqCst);
        assert_eq!(agenda.delete_session(doomed_id).await.unwrap(), 1);
        assert!(!store.is_scheduled(&bob, &doomed_id).await.unwrap());
        assert_eq!(store.user_count(), 0);

        assert_eq!(
            agenda.delete_session(doomed_id).await,
            Err(ScheduleError::NotFound(doomed_id))
        );
    }

    #[tokio::test]
    async fn delete_unscheduled_session_touches_nothing() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let conf = Ulid::new();
        catalog.create_conference(Conference::new(conf, "Conf")).unwrap();
        let s = session(conf, 9, 10);
        let id = s.id;
        catalog.add_session(s).unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(
            ScheduleStore::open(storage, catalog.clone(), Arc::new(NotifyHub::new()))
                .await
                .unwrap(),
        );
        let agenda = Agenda::from_parts(catalog, store);
        assert_eq!(agenda.delete_session(id).await.unwrap(), 0);
        assert_eq!(agenda.delete_session(id).await, Err(ScheduleError::NotFound(id)));
    }
}
