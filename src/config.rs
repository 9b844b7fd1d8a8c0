use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from `AGENDA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaConfig {
    /// Directory holding `schedule.wal`. `None` keeps schedules in memory only.
    pub data_dir: Option<PathBuf>,
    /// JSON catalog seed to load at startup.
    pub catalog_path: Option<PathBuf>,
    /// Prometheus exporter port. Disabled when unset.
    pub metrics_port: Option<u16>,
    /// Appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from("./data")),
            catalog_path: None,
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
        }
    }
}

impl AgendaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = match lookup("AGENDA_DATA_DIR") {
            Some(dir) if dir == ":memory:" => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => defaults.data_dir,
        };
        Self {
            data_dir,
            catalog_path: lookup("AGENDA_CATALOG_PATH").map(PathBuf::from),
            metrics_port: lookup("AGENDA_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: lookup("AGENDA_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            compact_interval: lookup("AGENDA_COMPACT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        }
    }

    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("schedule.wal"))
    }
}
