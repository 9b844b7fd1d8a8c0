use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::schedule::{ScheduleError, ScheduleStore};

/// Compact once at least `threshold` appends piled up. Returns whether it ran.
pub async fn compact_if_needed(
    store: &ScheduleStore,
    threshold: u64,
) -> Result<bool, ScheduleError> {
    let pending = store.appends_since_compact().await;
    if pending < threshold {
        debug!(pending, threshold, "compaction not needed");
        return Ok(false);
    }
    store.compact().await?;
    Ok(true)
}

/// Background task that periodically compacts the schedule log and drops
/// notification channels nobody listens on.
pub async fn run_compactor(store: Arc<ScheduleStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        store.notify.prune();
        if let Err(e) = compact_if_needed(&store, threshold).await {
            // Next tick retries; the uncompacted log stays valid meanwhile.
            warn!("compaction failed: {e}");
        }
    }
}
