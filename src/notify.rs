//! Alert notifiers.
//!
//! A notifier receives every alert the engine raises. Delivery is best-effort:
//! the outcome is logged by the caller and never feeds back into engine state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{info, warn};

use crate::engine::{Alert, AlertKind};
use crate::error::{ExecutionError, WatchError, WatchResult};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The alert was handed off.
    Delivered,
    /// The alert could not be handed off.
    NotDelivered,
}

impl Delivery {
    /// Returns true if the alert was handed off.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Receives alerts.
pub trait Notifier: Send + Sync {
    /// Name used for logging and preferred-notifier selection.
    fn name(&self) -> &str;

    /// Delivers one alert.
    fn notify(&self, alert: &Alert) -> Delivery;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn notify(&self, alert: &Alert) -> Delivery {
        (**self).notify(alert)
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn notify(&self, alert: &Alert) -> Delivery {
        (**self).notify(alert)
    }
}

/// Writes alerts as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Notifier name.
    pub const NAME: &'static str = "log";
}

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn notify(&self, alert: &Alert) -> Delivery {
        match &alert.kind {
            AlertKind::TimedOut {
                rule_name,
                expected_target,
                timeout_ms,
                elapsed_ms,
            } => warn!(
                alert_id = %alert.alert_id,
                rule = %rule_name,
                expected = %expected_target,
                timeout_ms,
                elapsed_ms,
                "{alert}"
            ),
            kind => info!(
                alert_id = %alert.alert_id,
                rule = %kind.rule_name(),
                kind = kind.label(),
                "{alert}"
            ),
        }
        Delivery::Delivered
    }
}

/// Forwards alerts into a bounded channel read through an [`AlertStream`].
///
/// Never blocks: a full or disconnected channel reports `NotDelivered`.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    name: String,
    tx: Sender<Alert>,
}

impl ChannelNotifier {
    /// Default notifier name.
    pub const NAME: &'static str = "channel";

    /// Creates a notifier and its stream with room for `capacity` alerts.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, AlertStream) {
        Self::named(Self::NAME, capacity)
    }

    /// Same as [`ChannelNotifier::new`] with a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>, capacity: usize) -> (Self, AlertStream) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { name: name.into(), tx }, AlertStream { rx })
    }
}

impl Notifier for ChannelNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&self, alert: &Alert) -> Delivery {
        match self.tx.try_send(alert.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => Delivery::NotDelivered,
        }
    }
}

/// Receiving side of a [`ChannelNotifier`].
#[derive(Debug)]
pub struct AlertStream {
    rx: Receiver<Alert>,
}

impl AlertStream {
    /// Receive the next alert (blocking).
    pub fn recv(&self) -> WatchResult<Alert> {
        self.rx.recv().map_err(|_| {
            WatchError::Execution(ExecutionError::Disconnected {
                path: "alert_stream".to_string(),
            })
        })
    }

    /// Receive the next alert with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> WatchResult<Alert> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => WatchError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => WatchError::Execution(ExecutionError::Disconnected {
                path: "alert_stream".to_string(),
            }),
        })
    }

    /// Drains alerts that are already queued.
    pub fn try_iter(&self) -> impl Iterator<Item = Alert> + '_ {
        self.rx.try_iter()
    }

    /// Number of queued alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Tries notifiers in order until one delivers.
///
/// The preferred notifier, when set and present, is tried first; the rest
/// follow in registration order.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
    preferred: Option<String>,
}

impl FanoutNotifier {
    /// Notifier name.
    pub const NAME: &'static str = "fanout";

    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notifier.
    #[must_use]
    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Sets the notifier tried first.
    #[must_use]
    pub fn prefer(mut self, name: impl Into<String>) -> Self {
        self.preferred = Some(name.into());
        self
    }

    /// Appends a notifier in place.
    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Notifier names in attempt order.
    #[must_use]
    pub fn attempt_order(&self) -> Vec<&str> {
        self.ordered().map(|n| n.name()).collect()
    }

    /// Number of notifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Returns true if no notifier is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn Notifier>> {
        let preferred = self
            .preferred
            .as_deref()
            .and_then(|p| self.notifiers.iter().position(|n| n.name() == p));

        preferred
            .map(|idx| &self.notifiers[idx])
            .into_iter()
            .chain(
                self.notifiers
                    .iter()
                    .enumerate()
                    .filter(move |(idx, _)| Some(*idx) != preferred)
                    .map(|(_, n)| n),
            )
    }
}

impl fmt::Debug for FanoutNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutNotifier")
            .field("notifiers", &self.attempt_order())
            .field("preferred", &self.preferred)
            .finish()
    }
}

impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn notify(&self, alert: &Alert) -> Delivery {
        if self.notifiers.is_empty() {
            warn!(alert_id = %alert.alert_id, "no notifiers configured, alert not delivered");
            return Delivery::NotDelivered;
        }

        for notifier in self.ordered() {
            if notifier.notify(alert).is_delivered() {
                return Delivery::Delivered;
            }
            warn!(notifier = notifier.name(), alert_id = %alert.alert_id, "notifier failed, trying next");
        }

        Delivery::NotDelivered
    }
}
