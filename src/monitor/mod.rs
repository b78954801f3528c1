//! Monitor loop.
//!
//! A [`Monitor`] owns one worker thread that polls the log source on a fixed
//! interval, feeds extracted nodes to the shared [`TimeoutEngine`], sweeps for
//! timeouts and hands the resulting alerts to the notifier. The engine lock is
//! released before any alert is delivered.
//!
//! [`TimeoutEngine`]: crate::engine::TimeoutEngine

mod context;
/// Poll cycle.
pub mod cycle;
/// Inline and queued alert delivery.
pub mod dispatch;
/// Status records.
pub mod status;
mod worker;

pub use context::WatchContext;
pub use cycle::{CycleOutcome, CycleRunner};
pub use dispatch::AlertDispatcher;
pub use status::{DetailedStatus, StatusSummary};
pub use worker::Monitor;
