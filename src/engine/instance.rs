//! Live rule instances and the bounded history log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of history entries retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// One in-progress occurrence of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInstance {
    rule_name: String,
    current_step_index: usize,
    activation_time: DateTime<Utc>,
    started_at: DateTime<Utc>,
}

impl RuleInstance {
    pub(crate) fn new(rule_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            rule_name: rule_name.into(),
            current_step_index: 0,
            activation_time: now,
            started_at: now,
        }
    }

    /// Restarts the current step's deadline without changing the step.
    pub(crate) fn reset(&mut self, now: DateTime<Utc>) {
        self.activation_time = now;
    }

    /// Moves to the next step and returns its index.
    pub(crate) fn step_forward(&mut self, now: DateTime<Utc>) -> usize {
        self.current_step_index += 1;
        self.activation_time = now;
        self.current_step_index
    }

    /// Owning rule.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Index of the step currently awaited.
    #[must_use]
    pub const fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// Time of the most recent reset or transition.
    #[must_use]
    pub const fn activation_time(&self) -> DateTime<Utc> {
        self.activation_time
    }

    /// Time the instance was created. Resets do not move it.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Milliseconds since the last reset or transition.
    #[must_use]
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.activation_time, now)
    }
}

/// Whole milliseconds from `from` to `to`, saturating at zero.
#[must_use]
pub fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

/// History entry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Instance created.
    Activated,
    /// Start node seen again while active.
    Reset,
    /// Intermediate step matched.
    Transition,
    /// Final step matched.
    Completed,
    /// Deadline passed.
    Timeout,
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Rule concerned.
    pub rule_name: String,
    /// What happened.
    pub kind: HistoryKind,
    /// Node observed, or the expected target for timeouts.
    pub node: String,
    /// Cycle time of the change.
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer of history entries; oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// Creates a history holding at most `capacity` entries. Zero disables it.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(crate) fn record(&mut self, rule_name: &str, kind: HistoryKind, node: &str, timestamp: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            rule_name: rule_name.to_string(),
            kind,
            node: node.to_string(),
            timestamp,
        });
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Entries for one rule, oldest first.
    pub fn for_rule<'a>(&'a self, rule_name: &'a str) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        self.entries.iter().filter(move |e| e.rule_name == rule_name)
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
