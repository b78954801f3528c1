use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use nodewatch::{AlertKind, HistoryKind, RuleDefinition, RuleRegistry, TimeoutEngine};

fn at(t0: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
    t0 + ChronoDuration::milliseconds(ms)
}

fn engine_with(rules: Vec<RuleDefinition>) -> TimeoutEngine {
    TimeoutEngine::new(Arc::new(RuleRegistry::from_rules(rules).unwrap()), 1_000)
}

fn rule_r() -> RuleDefinition {
    RuleDefinition::builder("R")
        .start("A")
        .step("B", 100)
        .step("C", 200)
        .description("A then B then C")
        .build()
        .unwrap()
}

#[test]
fn sequence_within_deadlines_completes_once() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);

    let mut alerts = engine.observe("A", t0);
    alerts.extend(engine.sweep(t0));
    alerts.extend(engine.observe("B", at(t0, 50)));
    alerts.extend(engine.sweep(at(t0, 50)));
    alerts.extend(engine.observe("C", at(t0, 150)));
    alerts.extend(engine.sweep(at(t0, 150)));

    let completed: Vec<&AlertKind> = alerts
        .iter()
        .map(|a| &a.kind)
        .filter(|k| matches!(k, AlertKind::Completed { .. }))
        .collect();
    assert_eq!(completed.len(), 1);
    let AlertKind::Completed { elapsed_ms, .. } = completed[0] else {
        unreachable!();
    };
    assert_eq!(*elapsed_ms, 150);
    assert!(!alerts.iter().any(|a| a.is_timeout()));

    let completions = engine
        .history()
        .iter()
        .filter(|e| e.kind == HistoryKind::Completed)
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn stall_on_first_step_times_out_expecting_b() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);

    engine.observe("A", t0);
    let alerts = engine.sweep(at(t0, 150));

    assert_eq!(alerts.len(), 1);
    let AlertKind::TimedOut {
        expected_target,
        elapsed_ms,
        timeout_ms,
        ..
    } = &alerts[0].kind
    else {
        panic!("expected a timeout");
    };
    assert_eq!(expected_target, "B");
    assert_eq!(*timeout_ms, 100);
    assert!(*elapsed_ms > 100);
    assert!(engine.instance("R").is_none());
}

#[test]
fn stall_on_second_step_measures_from_transition() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);

    engine.observe("A", t0);
    engine.observe("B", at(t0, 50));

    // 200ms after B exactly: not yet expired.
    assert!(engine.sweep(at(t0, 250)).is_empty());

    let alerts = engine.sweep(at(t0, 300));
    assert_eq!(alerts.len(), 1);
    let AlertKind::TimedOut {
        expected_target,
        elapsed_ms,
        ..
    } = &alerts[0].kind
    else {
        panic!("expected a timeout");
    };
    assert_eq!(expected_target, "C");
    assert!(*elapsed_ms > 200);
}

#[test]
fn retrigger_resets_elapsed_without_duplicate_activation() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);

    let first = engine.observe("A", t0);
    let second = engine.observe("A", at(t0, 90));
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(engine.active_count(), 1);
    assert_eq!(engine.instance("R").unwrap().elapsed_ms(at(t0, 90)), 0);

    assert!(engine.sweep(at(t0, 180)).is_empty());
    assert_eq!(engine.sweep(at(t0, 191)).len(), 1);
}

#[test]
fn at_most_one_instance_per_rule() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);

    for i in 0..20 {
        engine.observe(if i % 3 == 0 { "A" } else { "B" }, at(t0, i * 5));
        assert!(engine.active_count() <= 1);
    }
}

#[test]
fn unrelated_events_change_nothing() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);
    engine.observe("A", t0);
    let before = engine.snapshot(at(t0, 10));

    for node in ["X", "Y", "C", "Z"] {
        assert!(engine.observe(node, at(t0, 5)).is_empty());
    }
    assert_eq!(engine.snapshot(at(t0, 10)), before);
}

#[test]
fn repeated_sweeps_fire_once() {
    let t0 = Utc::now();
    let mut engine = engine_with(vec![rule_r()]);
    engine.observe("A", t0);

    let fired: usize = (1..=5).map(|i| engine.sweep(at(t0, 100 + i * 100)).len()).sum();
    assert_eq!(fired, 1);
}
