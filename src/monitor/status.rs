//! Status records returned by [`Monitor`](super::Monitor).

use serde::{Deserialize, Serialize};

use crate::engine::RuleStatus;

/// Overview of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Whether the worker thread is running.
    pub running: bool,
    /// Log file being tailed.
    pub log_source: Option<String>,
    /// Number of loaded rules.
    pub total_rules: usize,
    /// Number of live instances.
    pub active_instances: usize,
    /// Rules with a live instance, in registry order.
    pub active_rule_names: Vec<String>,
    /// Alerts dropped by a full dispatch queue.
    pub dropped_alerts: u64,
}

/// Overview plus per-rule progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedStatus {
    /// Same content as [`StatusSummary`].
    pub summary: StatusSummary,
    /// Every rule in registry order.
    pub rules: Vec<RuleStatus>,
}
