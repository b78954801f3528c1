//! Runtime configuration for the monitor.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_HISTORY_CAPACITY;

/// Default delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time `stop` waits for the worker to exit.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const MIN_DURATION: Duration = Duration::from_millis(1);

/// How alerts reach the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// The worker thread calls the notifier directly.
    #[default]
    Inline,
    /// Alerts go through a bounded queue drained by a delivery thread.
    /// A full queue drops the alert.
    Queued {
        /// Queue capacity (at least 1).
        capacity: usize,
    },
}

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Log file to tail.
    pub log_file_path: Option<PathBuf>,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Maximum time `stop` waits for the worker before detaching it.
    pub join_timeout: Duration,
    /// History ring size; zero disables history.
    pub history_capacity: usize,
    /// How alerts reach the notifier.
    pub dispatch: DispatchMode,
    /// Notifier tried first by a fan-out.
    pub preferred_notifier: Option<String>,
    /// Opaque `[notification]` settings.
    pub notification_settings: BTreeMap<String, String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_file_path: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            dispatch: DispatchMode::Inline,
            preferred_notifier: None,
            notification_settings: BTreeMap::new(),
        }
    }
}

impl WatchConfig {
    /// Sets the log file to tail.
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }

    /// Sets the poll interval (minimum 1ms).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_DURATION);
        self
    }

    /// Sets the join timeout (minimum 1ms).
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout.max(MIN_DURATION);
        self
    }

    /// Sets the history capacity.
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Sets the dispatch mode.
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Sets the preferred notifier.
    #[must_use]
    pub fn with_preferred_notifier(mut self, name: impl Into<String>) -> Self {
        self.preferred_notifier = Some(name.into());
        self
    }

    /// Poll interval, clamped to at least 1ms.
    #[must_use]
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_DURATION)
    }

    /// Join timeout, clamped to at least 1ms.
    #[must_use]
    pub fn effective_join_timeout(&self) -> Duration {
        self.join_timeout.max(MIN_DURATION)
    }
}
