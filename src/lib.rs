//! # nodewatch - log-driven sequence watchdog
//!
//! nodewatch tails a growing execution log, extracts named checkpoints
//! ("nodes") from each new line, and checks that expected ordered sequences of
//! nodes happen within per-step deadlines. Activations, transitions,
//! completions and timeouts are raised as alerts and handed to a notifier.
//!
//! ## Core Concepts
//!
//! - **Rule**: a start node plus ordered steps, each with a target node and a timeout
//! - **Instance**: a live occurrence of a rule; at most one per rule
//! - **Trigger / Advance / Sweep**: the three engine operations driving instances
//! - **Alert**: the payload delivered to a [`Notifier`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nodewatch::{load_config, Monitor, WatchContext};
//!
//! let loaded = load_config("watchdog.conf")?;
//! let monitor = Monitor::new(WatchContext::new(loaded.config, loaded.registry));
//! monitor.start()?;
//! // ...
//! println!("{:?}", monitor.get_status());
//! monitor.stop();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Definitions and input
pub mod config;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod rule;
pub mod tail;

// State machine and delivery
pub mod engine;
pub mod monitor;
pub mod notify;

pub use config::{DispatchMode, WatchConfig};
pub use engine::{
    ActiveStatus, Alert, AlertId, AlertKind, EngineSnapshot, HistoryEntry, HistoryKind, RuleInstance, RuleStatus,
    TimeoutEngine,
};
pub use error::{ExecutionError, SourceError, ValidationError, WatchError, WatchResult};
pub use extractor::{EventExtractor, NodeEvent, NodePattern, PatternKind};
pub use loader::{load_config, parse_config, LoadedConfig};
pub use monitor::{CycleRunner, DetailedStatus, Monitor, StatusSummary, WatchContext};
pub use notify::{AlertStream, ChannelNotifier, Delivery, FanoutNotifier, LogNotifier, Notifier};
pub use rule::{RuleBuilder, RuleDefinition, RuleRegistry, Step};
pub use tail::LogTail;
