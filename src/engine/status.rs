//! Owned status records built from engine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::Step;

/// Progress of an active instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStatus {
    /// Index of the awaited step.
    pub current_step_index: usize,
    /// Node the instance is waiting for.
    pub current_target: String,
    /// Deadline of the awaited step.
    pub current_timeout_ms: u64,
    /// Time of the last reset or transition.
    pub activation_time: DateTime<Utc>,
    /// Time the instance was created.
    pub started_at: DateTime<Utc>,
    /// Milliseconds since `activation_time`.
    pub elapsed_ms: u64,
    /// Milliseconds left before the step times out, floored at zero.
    pub remaining_ms: u64,
}

/// One rule and, if active, its instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStatus {
    /// Rule name.
    pub name: String,
    /// Start node.
    pub start_node: String,
    /// Rule description.
    pub description: String,
    /// All steps in order.
    pub steps: Vec<Step>,
    /// Live instance, if any.
    pub active: Option<ActiveStatus>,
}

impl RuleStatus {
    /// Returns true if the rule currently has a live instance.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

/// Point-in-time view of the whole engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Time the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Rules in registry order.
    pub rules: Vec<RuleStatus>,
}

impl EngineSnapshot {
    /// Number of rules.
    #[must_use]
    pub fn total_rules(&self) -> usize {
        self.rules.len()
    }

    /// Names of rules with a live instance, in registry order.
    #[must_use]
    pub fn active_rule_names(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.name.clone())
            .collect()
    }

    /// Number of live instances.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_active()).count()
    }
}
