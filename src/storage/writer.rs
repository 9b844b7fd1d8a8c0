use std::io;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};

use super::wal::Wal;
use super::{ScheduleStorage, StorageError};

const CHANNEL_CAPACITY: usize = 4096;

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Load {
        response: oneshot::Sender<io::Result<Vec<Event>>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Durable storage backed by a [`Wal`] owned by one background writer task.
///
/// Appends that arrive while a flush is in progress are batched and made
/// durable with a single fsync (group commit). Each caller is answered only
/// after its batch hit the disk.
pub struct WalStorage {
    tx: mpsc::Sender<WalCommand>,
}

impl WalStorage {
    /// Open the log and spawn its writer. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, existing) = Wal::open(path)?;
        tracing::info!(path = %path.display(), events = existing.len(), "opened schedule log");
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(writer_loop(wal, rx));
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<io::Result<T>>) -> WalCommand,
    ) -> Result<T, StorageError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| StorageError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StorageError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StorageError::Wal(e.to_string()))
    }
}

#[async_trait]
impl ScheduleStorage for WalStorage {
    async fn load(&self) -> Result<Vec<Event>, StorageError> {
        self.request(|response| WalCommand::Load { response }).await
    }

    async fn append(&self, event: &Event) -> Result<(), StorageError> {
        let event = event.clone();
        self.request(|response| WalCommand::Append { event, response })
            .await
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), StorageError> {
        self.request(|response| WalCommand::Compact { events, response })
            .await
    }

    async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// 1. Block until a command arrives.
/// 2. For an append, drain every append already queued behind it.
/// 3. One flush + fsync for the whole batch, then answer every sender.
/// 4. A non-append found while draining runs after the batch is flushed.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_other(&mut wal, other);
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let started = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush failed for {} events: {e}", batch.len());
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(other) = deferred {
            handle_other(&mut wal, other);
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_other(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = wal
                .flush_sync()
                .and_then(|()| Wal::write_compact_file(wal.path(), &events))
                .and_then(|()| wal.swap_compact_file());
            match &result {
                Ok(()) => tracing::info!(events = events.len(), "compacted schedule log"),
                Err(e) => tracing::error!("WAL compaction failed: {e}"),
            }
            let _ = response.send(result);
        }
        WalCommand::Load { response } => {
            let result = wal
                .flush_sync()
                .and_then(|()| Wal::replay(wal.path()))
                .map(|replay| replay.events);
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by writer_loop"),
    }
}
