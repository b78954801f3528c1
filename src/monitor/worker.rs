//! The monitor service and its worker thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{error, info, warn};

use crate::engine::TimeoutEngine;
use crate::error::{ExecutionError, WatchError, WatchResult};
use crate::tail::LogTail;

use super::context::WatchContext;
use super::cycle::{lock_engine, CycleRunner};
use super::dispatch::AlertDispatcher;
use super::status::{DetailedStatus, StatusSummary};

const WORKER_THREAD_NAME: &str = "nodewatch-monitor";

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: Sender<()>,
    exit_rx: Receiver<()>,
    join: JoinHandle<()>,
    /// Set when `stop` gave up waiting; the thread may still be alive.
    detached: bool,
}

impl WorkerHandle {
    fn is_live(&self) -> bool {
        !self.detached && !self.join.is_finished()
    }
}

/// Signals worker exit when dropped, including on panic.
struct ExitNotice(Sender<()>);

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Tails a log on a dedicated worker thread and feeds a [`TimeoutEngine`].
///
/// Status queries are safe from any thread while the worker runs. Engine state
/// survives `stop`, so a restarted monitor keeps timing live instances.
#[derive(Debug)]
pub struct Monitor {
    context: WatchContext,
    engine: Arc<Mutex<TimeoutEngine>>,
    dropped_alerts: Arc<AtomicU64>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Monitor {
    /// Creates a stopped monitor.
    #[must_use]
    pub fn new(context: WatchContext) -> Self {
        let engine = TimeoutEngine::new(Arc::clone(&context.registry), context.config.history_capacity);
        Self {
            context,
            engine: Arc::new(Mutex::new(engine)),
            dropped_alerts: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
        }
    }

    /// Starts the worker.
    ///
    /// Returns `Ok(false)` if it is already running, or if a worker detached
    /// by an earlier `stop` has not exited yet. The log source is opened
    /// before the thread is spawned; if that fails the error is returned and
    /// nothing runs.
    pub fn start(&self) -> WatchResult<bool> {
        let mut slot = self.worker_slot();
        if let Some(handle) = slot.as_ref() {
            if !handle.join.is_finished() {
                if handle.detached {
                    warn!("detached monitor worker has not exited yet, not starting");
                }
                return Ok(false);
            }
            if let Some(stale) = slot.take() {
                reap(stale);
            }
        }

        let path = self
            .context
            .config
            .log_file_path
            .clone()
            .ok_or_else(|| WatchError::config("no log file path configured"))?;

        let tail = LogTail::open(&path)?;
        let dispatcher = AlertDispatcher::start(
            self.context.config.dispatch,
            Arc::clone(&self.context.notifier),
            Arc::clone(&self.dropped_alerts),
        )?;
        let runner = CycleRunner::new(tail, self.context.extractor.clone(), Arc::clone(&self.engine));
        let interval = self.context.config.effective_poll_interval();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (exit_tx, exit_rx) = bounded::<()>(1);

        let join = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(runner, dispatcher, stop_rx, ExitNotice(exit_tx), interval))
            .map_err(|e| ExecutionError::SpawnFailed {
                name: WORKER_THREAD_NAME.to_string(),
                message: e.to_string(),
            })?;

        info!(
            log_source = %path.display(),
            rules = self.context.registry.len(),
            interval_ms = interval.as_millis() as u64,
            "monitor started"
        );

        *slot = Some(WorkerHandle {
            stop_tx,
            exit_rx,
            join,
            detached: false,
        });
        Ok(true)
    }

    /// Stops the worker.
    ///
    /// Returns `false` if it was not running. Waits up to the configured join
    /// timeout; a worker that has not exited by then is detached and kept
    /// until it finishes, so no second worker starts alongside it.
    pub fn stop(&self) -> bool {
        let mut slot = self.worker_slot();
        let Some(handle) = slot.take() else {
            return false;
        };
        if !handle.is_live() {
            if handle.join.is_finished() {
                reap(handle);
            } else {
                *slot = Some(handle);
            }
            return false;
        }

        let _ = handle.stop_tx.try_send(());
        let timeout = self.context.config.effective_join_timeout();

        match handle.exit_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => reap(handle),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "monitor worker did not exit in time, detaching"
                );
                *slot = Some(WorkerHandle {
                    detached: true,
                    ..handle
                });
            }
        }

        info!("monitor stopped");
        true
    }

    /// Returns true while a worker runs that has not been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker_slot().as_ref().is_some_and(WorkerHandle::is_live)
    }

    /// Overview of the monitor.
    #[must_use]
    pub fn get_status(&self) -> StatusSummary {
        let (active_instances, active_rule_names) = {
            let engine = lock_engine(&self.engine);
            let names: Vec<String> = engine
                .active_instances()
                .map(|instance| instance.rule_name().to_string())
                .collect();
            (names.len(), names)
        };
        self.summary(active_instances, active_rule_names)
    }

    /// Overview plus per-rule progress.
    #[must_use]
    pub fn get_detailed_status(&self) -> DetailedStatus {
        let snapshot = lock_engine(&self.engine).snapshot(Utc::now());
        let summary = self.summary(snapshot.active_count(), snapshot.active_rule_names());
        DetailedStatus {
            summary,
            rules: snapshot.rules,
        }
    }

    /// Runs `f` against the engine under its lock.
    pub fn with_engine<R>(&self, f: impl FnOnce(&TimeoutEngine) -> R) -> R {
        f(&lock_engine(&self.engine))
    }

    /// Alerts dropped by a full dispatch queue.
    #[must_use]
    pub fn dropped_alerts(&self) -> u64 {
        self.dropped_alerts.load(Ordering::Relaxed)
    }

    /// The context this monitor was built from.
    #[must_use]
    pub fn context(&self) -> &WatchContext {
        &self.context
    }

    fn summary(&self, active_instances: usize, active_rule_names: Vec<String>) -> StatusSummary {
        StatusSummary {
            running: self.is_running(),
            log_source: self
                .context
                .config
                .log_file_path
                .as_ref()
                .map(|p| p.display().to_string()),
            total_rules: self.context.registry.len(),
            active_instances,
            active_rule_names,
            dropped_alerts: self.dropped_alerts(),
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap(handle: WorkerHandle) {
    if handle.join.join().is_err() {
        error!("monitor worker panicked");
    }
}

fn worker_loop(
    mut runner: CycleRunner,
    dispatcher: AlertDispatcher,
    stop_rx: Receiver<()>,
    _exit: ExitNotice,
    interval: Duration,
) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let outcome = runner.run_cycle(Utc::now());
                dispatcher.dispatch(outcome.alerts);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
