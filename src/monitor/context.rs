use std::fmt;
use std::sync::Arc;

use crate::config::WatchConfig;
use crate::extractor::EventExtractor;
use crate::notify::{LogNotifier, Notifier};
use crate::rule::RuleRegistry;

/// Everything a [`Monitor`](super::Monitor) needs, built once by the caller.
#[derive(Clone)]
pub struct WatchContext {
    /// Runtime configuration.
    pub config: WatchConfig,
    /// Rules to track.
    pub registry: Arc<RuleRegistry>,
    /// Line-to-node extractor.
    pub extractor: EventExtractor,
    /// Alert sink.
    pub notifier: Arc<dyn Notifier>,
}

impl WatchContext {
    /// Creates a context with the default extractor and a [`LogNotifier`].
    #[must_use]
    pub fn new(config: WatchConfig, registry: RuleRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            extractor: EventExtractor::default(),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replaces the extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: EventExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchContext")
            .field("config", &self.config)
            .field("rules", &self.registry.len())
            .field("extractor", &self.extractor)
            .field("notifier", &self.notifier.name())
            .finish()
    }
}
