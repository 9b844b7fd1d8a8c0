//! Persistence for schedule mutations.
//!
//! The schedule store never reaches for a global client: it is handed a
//! [`ScheduleStorage`] at construction. Two implementations ship here:
//! [`MemoryStorage`] for tests and embedding, [`WalStorage`] for durability.

mod wal;
mod writer;

pub use wal::{Replay, Wal};
pub use writer::WalStorage;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The write-ahead log failed or its writer task is gone.
    Wal(String),
    /// A backing service (catalog, remote store) could not be reached.
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Wal(e) => write!(f, "WAL error: {e}"),
            StorageError::Unavailable(e) => write!(f, "storage unavailable: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

#[async_trait]
pub trait ScheduleStorage: Send + Sync {
    /// Every persisted event, oldest first.
    async fn load(&self) -> Result<Vec<Event>, StorageError>;

    /// Durably record one event. On error nothing may be considered written.
    async fn append(&self, event: &Event) -> Result<(), StorageError>;

    /// Replace the whole history with `events`.
    async fn compact(&self, events: Vec<Event>) -> Result<(), StorageError>;

    async fn appends_since_compact(&self) -> u64;
}

#[derive(Default)]
struct MemoryLog {
    events: Vec<Event>,
    appends_since_compact: u64,
}

/// Volatile storage. State is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryStorage {
    log: Mutex<MemoryLog>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with pre-existing history, e.g. to simulate a restart.
    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            log: Mutex::new(MemoryLog {
                events,
                appends_since_compact: 0,
            }),
        }
    }
}

#[async_trait]
impl ScheduleStorage for MemoryStorage {
    async fn load(&self) -> Result<Vec<Event>, StorageError> {
        Ok(self.log.lock().await.events.clone())
    }

    async fn append(&self, event: &Event) -> Result<(), StorageError> {
        let mut log = self.log.lock().await;
        log.events.push(event.clone());
        log.appends_since_compact += 1;
        Ok(())
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), StorageError> {
        let mut log = self.log.lock().await;
        log.events = events;
        log.appends_since_compact = 0;
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.log.lock().await.appends_since_compact
    }
}
