use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use nodewatch::{
    Alert, AlertKind, AlertStream, ChannelNotifier, DispatchMode, Monitor, RuleDefinition, RuleRegistry, WatchConfig,
    WatchContext,
};

fn append(path: &Path, text: &str) {
    let mut f = OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
    f.flush().unwrap();
}

fn registry() -> RuleRegistry {
    RuleRegistry::from_rules([
        RuleDefinition::builder("ingest")
            .start("Fetch")
            .step("Parse", 2_000)
            .step("Store", 2_000)
            .build()
            .unwrap(),
        RuleDefinition::builder("boot").start("Init").step("Ready", 150).build().unwrap(),
    ])
    .unwrap()
}

fn setup(dispatch: DispatchMode) -> (TempDir, std::path::PathBuf, Monitor, AlertStream) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("agent.log");
    std::fs::write(&path, "[old] [node_name=Fetch] replayed history must be ignored\n").unwrap();

    let config = WatchConfig::default()
        .with_log_file(&path)
        .with_poll_interval(Duration::from_millis(20))
        .with_join_timeout(Duration::from_secs(2))
        .with_dispatch(dispatch);
    let (notifier, stream) = ChannelNotifier::new(64);
    let context = WatchContext::new(config, registry()).with_notifier(Arc::new(notifier));
    let monitor = Monitor::new(context);
    (tmp, path, monitor, stream)
}

fn next_alert(stream: &AlertStream) -> Alert {
    stream.recv_timeout(Duration::from_secs(5)).unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn monitor_tracks_sequence_to_completion() {
    let (_tmp, path, monitor, stream) = setup(DispatchMode::Inline);
    assert!(monitor.start().unwrap());

    append(&path, "[2024][INFO] [node_name=Fetch] begin\n");
    let alert = next_alert(&stream);
    assert!(matches!(&alert.kind, AlertKind::Activated { rule_name, .. } if rule_name == "ingest"));
    assert!(wait_until(|| monitor.get_status().active_rule_names == vec!["ingest".to_string()]));

    append(&path, "[2024] [node_name=Parse]\n[2024] [node_name=Store]\n");
    let transition = next_alert(&stream);
    assert!(matches!(&transition.kind, AlertKind::Transition { next_target, .. } if next_target == "Store"));
    let done = next_alert(&stream);
    assert!(matches!(&done.kind, AlertKind::Completed { final_node, .. } if final_node == "Store"));

    assert!(wait_until(|| monitor.get_status().active_instances == 0));
    assert!(monitor.stop());
    assert!(!monitor.is_running());
}

#[test]
fn monitor_reports_timeout_and_detailed_status() {
    let (_tmp, path, monitor, stream) = setup(DispatchMode::Inline);
    monitor.start().unwrap();

    append(&path, "[t] [node_name=Init]\n");
    assert!(matches!(next_alert(&stream).kind, AlertKind::Activated { .. }));

    let detailed = monitor.get_detailed_status();
    assert!(detailed.summary.running);
    assert_eq!(detailed.summary.total_rules, 2);
    let boot = detailed.rules.iter().find(|r| r.name == "boot").unwrap();
    if let Some(active) = &boot.active {
        assert_eq!(active.current_target, "Ready");
        assert!(active.remaining_ms <= 150);
    }

    let timeout = next_alert(&stream);
    let AlertKind::TimedOut {
        rule_name,
        expected_target,
        elapsed_ms,
        ..
    } = &timeout.kind
    else {
        panic!("expected timeout, got {:?}", timeout.kind);
    };
    assert_eq!(rule_name, "boot");
    assert_eq!(expected_target, "Ready");
    assert!(*elapsed_ms > 150);

    monitor.stop();
}

#[test]
fn partial_lines_are_held_until_completed() {
    let (_tmp, path, monitor, stream) = setup(DispatchMode::Inline);
    monitor.start().unwrap();

    append(&path, "[t] [node_name=Fet");
    std::thread::sleep(Duration::from_millis(150));
    assert!(stream.is_empty());
    assert_eq!(monitor.get_status().active_instances, 0);

    append(&path, "ch]\n");
    let alert = next_alert(&stream);
    assert_eq!(alert.rule_name(), "ingest");

    monitor.stop();
}

#[test]
fn queued_dispatch_delivers_alerts() {
    let (_tmp, path, monitor, stream) = setup(DispatchMode::Queued { capacity: 16 });
    monitor.start().unwrap();

    append(&path, "[t] [node_name=Init]\n[t] [node_name=Ready]\n");
    let labels = [next_alert(&stream).kind.label(), next_alert(&stream).kind.label()];
    assert_eq!(labels, ["activated", "completed"]);
    assert_eq!(monitor.get_status().dropped_alerts, 0);

    monitor.stop();
}

#[test]
fn state_survives_restart() {
    let (_tmp, path, monitor, stream) = setup(DispatchMode::Inline);
    monitor.start().unwrap();
    append(&path, "[t] [node_name=Fetch]\n");
    next_alert(&stream);
    assert!(monitor.stop());

    assert!(monitor.start().unwrap());
    assert!(monitor.with_engine(|engine| engine.is_active("ingest")));
    monitor.stop();
}
