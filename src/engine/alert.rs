//! Alert payloads produced by the engine.
//!
//! Alerts are serializable so notifiers can forward them verbatim (JSON over a
//! channel, structured log fields, or an external transport).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Create a new random alert id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What happened to a rule instance.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// A new instance was created by the rule's start node.
    Activated {
        rule_name: String,
        start_node: String,
        /// Deadline of the first step.
        timeout_ms: u64,
    },
    /// The instance matched its current target and moved to the next step.
    Transition {
        rule_name: String,
        /// Node that was just matched.
        node: String,
        /// Index of the step now being waited on.
        step_index: usize,
        next_target: String,
        timeout_ms: u64,
    },
    /// The final step matched.
    Completed {
        rule_name: String,
        final_node: String,
        /// Time since the instance was first activated.
        elapsed_ms: u64,
    },
    /// The current step's deadline passed.
    TimedOut {
        rule_name: String,
        expected_target: String,
        timeout_ms: u64,
        /// Time since the last reset or transition.
        elapsed_ms: u64,
    },
}

impl AlertKind {
    /// Rule this alert concerns.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        match self {
            Self::Activated { rule_name, .. }
            | Self::Transition { rule_name, .. }
            | Self::Completed { rule_name, .. }
            | Self::TimedOut { rule_name, .. } => rule_name,
        }
    }

    /// Short label, used as a structured log field.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::Transition { .. } => "transition",
            Self::Completed { .. } => "completed",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// A notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id.
    pub alert_id: AlertId,
    /// Cycle time at which the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Alert details.
    pub kind: AlertKind,
}

impl Alert {
    /// Creates an alert with a fresh id.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, kind: AlertKind) -> Self {
        Self {
            alert_id: AlertId::new(),
            timestamp,
            kind,
        }
    }

    /// Rule this alert concerns.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        self.kind.rule_name()
    }

    /// Returns true for timeout alerts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, AlertKind::TimedOut { .. })
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AlertKind::Activated {
                rule_name,
                start_node,
                timeout_ms,
            } => write!(f, "[{rule_name}] activated by '{start_node}', first step due in {timeout_ms}ms"),
            AlertKind::Transition {
                rule_name,
                node,
                step_index,
                next_target,
                timeout_ms,
            } => write!(
                f,
                "[{rule_name}] reached '{node}', step {step_index} expects '{next_target}' within {timeout_ms}ms"
            ),
            AlertKind::Completed {
                rule_name,
                final_node,
                elapsed_ms,
            } => write!(f, "[{rule_name}] completed at '{final_node}' after {elapsed_ms}ms"),
            AlertKind::TimedOut {
                rule_name,
                expected_target,
                timeout_ms,
                elapsed_ms,
            } => write!(
                f,
                "[{rule_name}] timed out waiting for '{expected_target}': {elapsed_ms}ms elapsed, limit {timeout_ms}ms"
            ),
        }
    }
}
