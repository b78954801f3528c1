//! One poll cycle: read, extract, feed the engine, sweep.

use std::fs::File;
use std::io::{Read, Seek};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::engine::{Alert, TimeoutEngine};
use crate::extractor::EventExtractor;
use crate::tail::LogTail;

/// Result of one cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Complete lines read.
    pub lines: usize,
    /// Lines that yielded a node.
    pub events: usize,
    /// Whether the read failed (the sweep still ran).
    pub read_failed: bool,
    /// Alerts in the order they were raised.
    pub alerts: Vec<Alert>,
}

/// Runs poll cycles against a shared engine.
#[derive(Debug)]
pub struct CycleRunner<S = File> {
    tail: LogTail<S>,
    extractor: EventExtractor,
    engine: Arc<Mutex<TimeoutEngine>>,
}

impl<S: Read + Seek> CycleRunner<S> {
    /// Creates a runner owning `tail`.
    #[must_use]
    pub fn new(tail: LogTail<S>, extractor: EventExtractor, engine: Arc<Mutex<TimeoutEngine>>) -> Self {
        Self {
            tail,
            extractor,
            engine,
        }
    }

    /// Runs one cycle at `now`.
    ///
    /// The log is read before the engine lock is taken. The lock is then held
    /// for the whole batch, so status readers never see a half-processed
    /// cycle. The returned alerts have not been delivered.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        let lines = match self.tail.poll() {
            Ok(lines) => lines,
            Err(e) => {
                outcome.read_failed = true;
                warn!(error = %e, "log read failed, retrying next cycle");
                Vec::new()
            }
        };
        outcome.lines = lines.len();
        let events: Vec<_> = lines.iter().filter_map(|line| self.extractor.extract(line)).collect();
        outcome.events = events.len();

        let mut engine = lock_engine(&self.engine);
        for event in &events {
            debug!(node = %event.node, kind = %event.kind, "node observed");
            outcome.alerts.extend(engine.trigger(&event.node, now));
            outcome.alerts.extend(engine.advance(&event.node, now));
        }
        outcome.alerts.extend(engine.sweep(now));
        drop(engine);

        if outcome.lines > 0 || !outcome.alerts.is_empty() {
            debug!(
                lines = outcome.lines,
                events = outcome.events,
                alerts = outcome.alerts.len(),
                "cycle finished"
            );
        }
        outcome
    }

    /// The reader owned by this runner.
    #[must_use]
    pub fn tail(&self) -> &LogTail<S> {
        &self.tail
    }
}

/// Locks the engine, recovering from poisoning.
pub(crate) fn lock_engine(engine: &Mutex<TimeoutEngine>) -> MutexGuard<'_, TimeoutEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}
