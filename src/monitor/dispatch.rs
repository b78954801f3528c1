//! Alert delivery.
//!
//! Inline dispatch calls the notifier on the worker thread. Queued dispatch
//! hands alerts to a bounded channel drained by a `nodewatch-dispatch`
//! thread; the worker never blocks on it and a full queue drops the alert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::config::DispatchMode;
use crate::engine::Alert;
use crate::error::{ExecutionError, WatchResult};
use crate::notify::{Delivery, Notifier};

const DISPATCH_THREAD_NAME: &str = "nodewatch-dispatch";

/// Delivers alerts according to a [`DispatchMode`].
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    queue: Option<Sender<Alert>>,
    dropped_alerts: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    /// Creates a dispatcher, spawning the delivery thread in queued mode.
    ///
    /// Alerts dropped on a full queue are counted in `dropped_alerts`.
    pub fn start(
        mode: DispatchMode,
        notifier: Arc<dyn Notifier>,
        dropped_alerts: Arc<AtomicU64>,
    ) -> WatchResult<Self> {
        let (queue, join) = match mode {
            DispatchMode::Inline => (None, None),
            DispatchMode::Queued { capacity } => {
                let (tx, rx) = bounded::<Alert>(capacity.max(1));
                let thread_notifier = Arc::clone(&notifier);
                let join = thread::Builder::new()
                    .name(DISPATCH_THREAD_NAME.to_string())
                    .spawn(move || delivery_loop(thread_notifier.as_ref(), rx))
                    .map_err(|e| ExecutionError::SpawnFailed {
                        name: DISPATCH_THREAD_NAME.to_string(),
                        message: e.to_string(),
                    })?;
                (Some(tx), Some(join))
            }
        };

        Ok(Self {
            notifier,
            queue,
            dropped_alerts,
            join,
        })
    }

    /// Delivers or enqueues `alerts` in order.
    pub fn dispatch(&self, alerts: Vec<Alert>) {
        match &self.queue {
            None => {
                for alert in &alerts {
                    deliver(self.notifier.as_ref(), alert);
                }
            }
            Some(tx) => {
                for alert in alerts {
                    match tx.try_send(alert) {
                        Ok(()) => {}
                        Err(TrySendError::Full(alert)) | Err(TrySendError::Disconnected(alert)) => {
                            self.dropped_alerts.fetch_add(1, Ordering::Relaxed);
                            warn!(alert_id = %alert.alert_id, rule = %alert.rule_name(), "alert queue full, alert dropped");
                        }
                    }
                }
            }
        }
    }

    /// Returns true in queued mode.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        self.queue.is_some()
    }

    /// Alerts dropped so far.
    #[must_use]
    pub fn dropped_alerts(&self) -> u64 {
        self.dropped_alerts.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("notifier", &self.notifier.name())
            .field("queued", &self.is_queued())
            .field("dropped_alerts", &self.dropped_alerts())
            .finish()
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the delivery thread drain and exit. It is not
        // joined: a slow notifier must not hold up worker shutdown.
        drop(self.queue.take());
        drop(self.join.take());
    }
}

fn delivery_loop(notifier: &dyn Notifier, rx: Receiver<Alert>) {
    for alert in rx {
        deliver(notifier, &alert);
    }
    debug!("alert queue closed, delivery thread exiting");
}

fn deliver(notifier: &dyn Notifier, alert: &Alert) {
    match notifier.notify(alert) {
        Delivery::Delivered => {
            debug!(notifier = notifier.name(), alert_id = %alert.alert_id, "alert delivered");
        }
        Delivery::NotDelivered => {
            warn!(
                notifier = notifier.name(),
                alert_id = %alert.alert_id,
                rule = %alert.rule_name(),
                "alert not delivered"
            );
        }
    }
}
