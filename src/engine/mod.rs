//! Timeout tracking engine.
//!
//! The engine owns every live rule instance. It is driven by three operations,
//! each taking the cycle time explicitly so behaviour is deterministic:
//!
//! - `trigger` creates or resets instances for rules started by a node;
//! - `advance` moves active instances whose current target is the node;
//! - `sweep` expires instances whose current step deadline has passed.
//!
//! Every operation returns the alerts it raised instead of delivering them, so
//! a caller can finish mutating state before any notifier runs. Rules are
//! always evaluated in registry order, which fixes the alert order when several
//! rules react to the same node.

mod alert;
mod instance;
mod status;

pub use alert::{Alert, AlertId, AlertKind};
pub use instance::{elapsed_ms, History, HistoryEntry, HistoryKind, RuleInstance, DEFAULT_HISTORY_CAPACITY};
pub use status::{ActiveStatus, EngineSnapshot, RuleStatus};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::rule::RuleRegistry;

/// State machine tracking one instance per rule.
#[derive(Debug)]
pub struct TimeoutEngine {
    registry: Arc<RuleRegistry>,
    active: HashMap<String, RuleInstance>,
    history: History,
}

impl TimeoutEngine {
    /// Creates an engine over `registry` retaining up to `history_capacity`
    /// history entries.
    #[must_use]
    pub fn new(registry: Arc<RuleRegistry>, history_capacity: usize) -> Self {
        Self {
            registry,
            active: HashMap::new(),
            history: History::with_capacity(history_capacity),
        }
    }

    /// Creates or resets instances of every rule whose start node is `node`.
    ///
    /// A new instance raises `Activated`. An existing one is reset in place:
    /// its deadline restarts but its step index is kept, and no alert is raised.
    pub fn trigger(&mut self, node: &str, now: DateTime<Utc>) -> Vec<Alert> {
        let registry = Arc::clone(&self.registry);
        let mut alerts = Vec::new();

        for rule in registry.started_by(node) {
            if let Some(instance) = self.active.get_mut(rule.name()) {
                instance.reset(now);
                self.history.record(rule.name(), HistoryKind::Reset, node, now);
                debug!(rule = %rule.name(), step = instance.current_step_index(), "rule instance reset");
                continue;
            }

            self.active
                .insert(rule.name().to_string(), RuleInstance::new(rule.name(), now));
            self.history.record(rule.name(), HistoryKind::Activated, node, now);
            debug!(rule = %rule.name(), "rule instance activated");

            let timeout_ms = rule.steps().first().map_or(0, |s| s.timeout_ms);
            alerts.push(Alert::new(
                now,
                AlertKind::Activated {
                    rule_name: rule.name().to_string(),
                    start_node: rule.start_node().to_string(),
                    timeout_ms,
                },
            ));
        }

        alerts
    }

    /// Advances every active instance whose current target is `node`.
    ///
    /// Heartbeat rules (start node equal to their only target) are skipped:
    /// their node always counts as a trigger, so they reset or time out but
    /// never complete. Longer rules may revisit their start node as a step.
    pub fn advance(&mut self, node: &str, now: DateTime<Utc>) -> Vec<Alert> {
        let registry = Arc::clone(&self.registry);
        let mut alerts = Vec::new();

        for rule in registry.iter() {
            if rule.is_heartbeat() {
                continue;
            }
            let Some(instance) = self.active.get_mut(rule.name()) else {
                continue;
            };
            let Some(step) = rule.step(instance.current_step_index()) else {
                continue;
            };
            if step.target_node != node {
                continue;
            }

            let next_index = instance.step_forward(now);
            let started_at = instance.started_at();

            match rule.step(next_index) {
                Some(next) => {
                    self.history.record(rule.name(), HistoryKind::Transition, node, now);
                    debug!(rule = %rule.name(), node, step = next_index, "rule instance advanced");
                    alerts.push(Alert::new(
                        now,
                        AlertKind::Transition {
                            rule_name: rule.name().to_string(),
                            node: node.to_string(),
                            step_index: next_index,
                            next_target: next.target_node.clone(),
                            timeout_ms: next.timeout_ms,
                        },
                    ));
                }
                None => {
                    self.active.remove(rule.name());
                    self.history.record(rule.name(), HistoryKind::Completed, node, now);
                    debug!(rule = %rule.name(), node, "rule instance completed");
                    alerts.push(Alert::new(
                        now,
                        AlertKind::Completed {
                            rule_name: rule.name().to_string(),
                            final_node: node.to_string(),
                            elapsed_ms: elapsed_ms(started_at, now),
                        },
                    ));
                }
            }
        }

        alerts
    }

    /// Expires every instance whose current step deadline has passed.
    ///
    /// An instance times out once strictly more than the step timeout has
    /// elapsed since its last reset or transition. Expired instances are
    /// removed, so repeated sweeps never fire twice.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        let registry = Arc::clone(&self.registry);
        let mut alerts = Vec::new();

        for rule in registry.iter() {
            let Some(instance) = self.active.get(rule.name()) else {
                continue;
            };
            let Some(step) = rule.step(instance.current_step_index()) else {
                continue;
            };

            let elapsed = instance.elapsed_ms(now);
            if elapsed <= step.timeout_ms {
                continue;
            }

            self.active.remove(rule.name());
            self.history
                .record(rule.name(), HistoryKind::Timeout, &step.target_node, now);
            debug!(rule = %rule.name(), expected = %step.target_node, elapsed_ms = elapsed, "rule instance timed out");
            alerts.push(Alert::new(
                now,
                AlertKind::TimedOut {
                    rule_name: rule.name().to_string(),
                    expected_target: step.target_node.clone(),
                    timeout_ms: step.timeout_ms,
                    elapsed_ms: elapsed,
                },
            ));
        }

        alerts
    }

    /// Feeds one observed node: `trigger` then `advance`.
    pub fn observe(&mut self, node: &str, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = self.trigger(node, now);
        alerts.extend(self.advance(node, now));
        alerts
    }

    /// Rules tracked by this engine.
    #[must_use]
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Live instance of `rule_name`, if any.
    #[must_use]
    pub fn instance(&self, rule_name: &str) -> Option<&RuleInstance> {
        self.active.get(rule_name)
    }

    /// Live instances in registry order.
    pub fn active_instances(&self) -> impl Iterator<Item = &RuleInstance> {
        self.registry
            .iter()
            .filter_map(move |rule| self.active.get(rule.name()))
    }

    /// Number of live instances.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns true if `rule_name` has a live instance.
    #[must_use]
    pub fn is_active(&self, rule_name: &str) -> bool {
        self.active.contains_key(rule_name)
    }

    /// Recorded state changes.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Builds an owned view of every rule and its instance at `now`.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> EngineSnapshot {
        let rules = self
            .registry
            .iter()
            .map(|rule| {
                let active = self.active.get(rule.name()).and_then(|instance| {
                    let step = rule.step(instance.current_step_index())?;
                    let elapsed = instance.elapsed_ms(now);
                    Some(ActiveStatus {
                        current_step_index: instance.current_step_index(),
                        current_target: step.target_node.clone(),
                        current_timeout_ms: step.timeout_ms,
                        activation_time: instance.activation_time(),
                        started_at: instance.started_at(),
                        elapsed_ms: elapsed,
                        remaining_ms: step.timeout_ms.saturating_sub(elapsed),
                    })
                });

                RuleStatus {
                    name: rule.name().to_string(),
                    start_node: rule.start_node().to_string(),
                    description: rule.description().to_string(),
                    steps: rule.steps().to_vec(),
                    active,
                }
            })
            .collect();

        EngineSnapshot { taken_at: now, rules }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::rule::RuleDefinition;

    fn at(t0: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
        t0 + Duration::milliseconds(ms)
    }

    fn pipeline() -> RuleDefinition {
        RuleDefinition::builder("R")
            .start("A")
            .step("B", 100)
            .step("C", 200)
            .build()
            .unwrap()
    }

    fn engine(rules: Vec<RuleDefinition>) -> TimeoutEngine {
        let registry = RuleRegistry::from_rules(rules).unwrap();
        TimeoutEngine::new(Arc::new(registry), DEFAULT_HISTORY_CAPACITY)
    }

    fn history_kinds(engine: &TimeoutEngine) -> Vec<HistoryKind> {
        engine.history().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_trigger_activates_once() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        let alerts = engine.trigger("A", t0);
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            &alerts[0].kind,
            AlertKind::Activated { rule_name, start_node, timeout_ms: 100 } if rule_name == "R" && start_node == "A"
        ));
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.instance("R").unwrap().current_step_index(), 0);
    }

    #[test]
    fn test_retrigger_resets_without_second_instance_or_alert() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.trigger("A", t0);
        let alerts = engine.trigger("A", at(t0, 80));
        assert!(alerts.is_empty());
        assert_eq!(engine.active_count(), 1);

        let instance = engine.instance("R").unwrap();
        assert_eq!(instance.activation_time(), at(t0, 80));
        assert_eq!(instance.started_at(), t0);
        assert_eq!(instance.elapsed_ms(at(t0, 80)), 0);

        // 150ms after the first trigger but only 70ms after the reset.
        assert!(engine.sweep(at(t0, 150)).is_empty());
        assert_eq!(history_kinds(&engine), vec![HistoryKind::Activated, HistoryKind::Reset]);
    }

    #[test]
    fn test_reset_keeps_step_index() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.observe("A", t0);
        engine.observe("B", at(t0, 50));
        engine.observe("A", at(t0, 60));

        assert_eq!(engine.instance("R").unwrap().current_step_index(), 1);
    }

    #[test]
    fn test_full_sequence_completes() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.observe("A", t0);
        let transition = engine.observe("B", at(t0, 50));
        assert!(matches!(
            &transition[0].kind,
            AlertKind::Transition { step_index: 1, next_target, timeout_ms: 200, .. } if next_target == "C"
        ));

        let done = engine.observe("C", at(t0, 150));
        assert_eq!(done.len(), 1);
        assert!(matches!(
            &done[0].kind,
            AlertKind::Completed { final_node, elapsed_ms: 150, .. } if final_node == "C"
        ));

        assert!(!engine.is_active("R"));
        assert!(engine.sweep(at(t0, 1_000)).is_empty());
        assert_eq!(
            history_kinds(&engine),
            vec![HistoryKind::Activated, HistoryKind::Transition, HistoryKind::Completed]
        );
    }

    #[test]
    fn test_first_step_timeout() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.observe("A", t0);
        assert!(engine.sweep(at(t0, 100)).is_empty());

        let alerts = engine.sweep(at(t0, 150));
        assert_eq!(alerts.len(), 1);
        let AlertKind::TimedOut {
            expected_target,
            timeout_ms,
            elapsed_ms,
            ..
        } = &alerts[0].kind
        else {
            panic!("expected timeout, got {:?}", alerts[0].kind);
        };
        assert_eq!(expected_target, "B");
        assert_eq!(*timeout_ms, 100);
        assert!(*elapsed_ms > 100);
        assert!(!engine.is_active("R"));
    }

    #[test]
    fn test_second_step_timeout_measured_from_transition() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.observe("A", t0);
        engine.observe("B", at(t0, 50));
        assert!(engine.sweep(at(t0, 250)).is_empty());

        let alerts = engine.sweep(at(t0, 300));
        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            &alerts[0].kind,
            AlertKind::TimedOut { expected_target, elapsed_ms: 250, .. } if expected_target == "C"
        ));
    }

    #[test]
    fn test_sweep_never_double_fires() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.observe("A", t0);
        assert_eq!(engine.sweep(at(t0, 500)).len(), 1);
        assert!(engine.sweep(at(t0, 600)).is_empty());
        assert_eq!(engine.history().for_rule("R").filter(|e| e.kind == HistoryKind::Timeout).count(), 1);
    }

    #[test]
    fn test_unrelated_events_leave_instances_unchanged() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);

        engine.observe("A", t0);
        let before = engine.instance("R").cloned();

        assert!(engine.observe("Z", at(t0, 30)).is_empty());
        assert!(engine.observe("C", at(t0, 40)).is_empty());
        assert_eq!(engine.instance("R").cloned(), before);
    }

    #[test]
    fn test_advance_without_instance_is_noop() {
        let t0 = Utc::now();
        let mut engine = engine(vec![pipeline()]);
        assert!(engine.advance("B", t0).is_empty());
        assert_eq!(engine.active_count(), 0);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_heartbeat_rule_only_resets_or_times_out() {
        let t0 = Utc::now();
        let hb = RuleDefinition::builder("hb").start("tick").step("tick", 100).build().unwrap();
        let mut engine = engine(vec![hb]);

        assert_eq!(engine.observe("tick", t0).len(), 1);
        assert!(engine.observe("tick", at(t0, 90)).is_empty());
        assert!(engine.is_active("hb"));
        assert!(engine.sweep(at(t0, 180)).is_empty());

        let alerts = engine.sweep(at(t0, 191));
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_timeout());
    }

    #[test]
    fn test_rule_returning_to_start_node_completes() {
        let t0 = Utc::now();
        let round_trip = RuleDefinition::builder("loop")
            .start("A")
            .step("B", 100)
            .step("A", 100)
            .build()
            .unwrap();
        let mut engine = engine(vec![round_trip]);

        engine.observe("A", t0);
        engine.observe("B", at(t0, 10));
        let alerts = engine.observe("A", at(t0, 20));

        assert_eq!(alerts.len(), 1);
        assert!(matches!(
            &alerts[0].kind,
            AlertKind::Completed { final_node, elapsed_ms: 20, .. } if final_node == "A"
        ));
        assert!(!engine.is_active("loop"));
        assert!(engine.sweep(at(t0, 500)).is_empty());
        assert_eq!(
            history_kinds(&engine),
            vec![
                HistoryKind::Activated,
                HistoryKind::Transition,
                HistoryKind::Reset,
                HistoryKind::Completed
            ]
        );
    }

    #[test]
    fn test_alerts_follow_registry_order() {
        let t0 = Utc::now();
        let second = RuleDefinition::builder("second").start("A").step("X", 10).build().unwrap();
        let first = RuleDefinition::builder("first").start("A").step("Y", 10).build().unwrap();
        let mut engine = engine(vec![second, first]);

        let names: Vec<String> = engine
            .trigger("A", t0)
            .iter()
            .map(|a| a.rule_name().to_string())
            .collect();
        assert_eq!(names, vec!["second", "first"]);

        let names: Vec<String> = engine
            .sweep(at(t0, 20))
            .iter()
            .map(|a| a.rule_name().to_string())
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_node_can_complete_one_rule_and_start_another() {
        let t0 = Utc::now();
        let upstream = RuleDefinition::builder("up").start("A").step("B", 100).build().unwrap();
        let downstream = RuleDefinition::builder("down").start("B").step("C", 100).build().unwrap();
        let mut engine = engine(vec![upstream, downstream]);

        engine.observe("A", t0);
        let alerts = engine.observe("B", at(t0, 10));
        let kinds: Vec<&str> = alerts.iter().map(|a| a.kind.label()).collect();
        assert_eq!(kinds, vec!["activated", "completed"]);
        assert!(engine.is_active("down"));
        assert!(!engine.is_active("up"));
    }

    #[test]
    fn test_snapshot_reports_progress() {
        let t0 = Utc::now();
        let idle = RuleDefinition::builder("idle").start("Q").step("W", 10).build().unwrap();
        let mut engine = engine(vec![pipeline(), idle]);

        engine.observe("A", t0);
        engine.observe("B", at(t0, 50));

        let snapshot = engine.snapshot(at(t0, 120));
        assert_eq!(snapshot.total_rules(), 2);
        assert_eq!(snapshot.active_rule_names(), vec!["R".to_string()]);

        let active = snapshot.rules[0].active.as_ref().unwrap();
        assert_eq!(active.current_step_index, 1);
        assert_eq!(active.current_target, "C");
        assert_eq!(active.elapsed_ms, 70);
        assert_eq!(active.remaining_ms, 130);
        assert!(snapshot.rules[1].active.is_none());

        let late = engine.snapshot(at(t0, 900));
        assert_eq!(late.rules[0].active.as_ref().unwrap().remaining_ms, 0);
    }

    #[test]
    fn test_active_instances_follow_registry_order() {
        let t0 = Utc::now();
        let a = RuleDefinition::builder("a").start("S").step("T", 10).build().unwrap();
        let b = RuleDefinition::builder("b").start("S").step("T", 10).build().unwrap();
        let mut engine = engine(vec![a, b]);
        engine.trigger("S", t0);

        let names: Vec<&str> = engine.active_instances().map(RuleInstance::rule_name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
