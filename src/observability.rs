use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: schedule operations executed. Labels: op, status.
pub const SCHEDULE_OPS_TOTAL: &str = "agenda_schedule_ops_total";

/// Histogram: schedule operation latency in seconds. Labels: op.
pub const SCHEDULE_OP_DURATION_SECONDS: &str = "agenda_schedule_op_duration_seconds";

/// Counter: entries that turned from conflict-free to conflicting.
pub const CONFLICTS_DETECTED_TOTAL: &str = "agenda_conflicts_detected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: users with a loaded schedule.
pub const USERS_ACTIVE: &str = "agenda_users_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "agenda_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "agenda_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "agenda_wal_compactions_total";

/// Schedule operations, used as the `op` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Remove,
    Purge,
}

impl Op {
    pub fn label(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Remove => "remove",
            Op::Purge => "purge",
        }
    }
}

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
