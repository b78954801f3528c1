//! `watchdog.conf` loader.
//!
//! The file is line oriented: `[section]` headers, `key = value` pairs, `#`
//! comments. Rules live in `[rules]` or `[states]` and use the form
//!
//! ```text
//! Name={Start, Timeout1, Target1, Timeout2, Target2, ..., Description}
//! ```
//!
//! where braces are optional. A rule that cannot be parsed or validated is
//! skipped with a warning; it never aborts the load.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{DispatchMode, WatchConfig, DEFAULT_JOIN_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::error::{ValidationError, WatchError, WatchResult};
use crate::rule::{RuleDefinition, RuleRegistry, Step};

/// Parsed configuration file.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    /// Runtime settings.
    pub config: WatchConfig,
    /// Rules that parsed and validated, in file order.
    pub registry: RuleRegistry,
    /// One `MalformedRule` per skipped rule.
    pub skipped: Vec<ValidationError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Monitoring,
    Notification,
    Rules,
    Unknown,
}

impl Section {
    fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "monitoring" => Self::Monitoring,
            "notification" => Self::Notification,
            "rules" | "states" => Self::Rules,
            _ => Self::Unknown,
        }
    }
}

/// Reads and parses a configuration file.
///
/// Only an unreadable file is an error; everything inside it degrades to
/// warnings.
pub fn load_config(path: impl AsRef<Path>) -> WatchResult<LoadedConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| WatchError::config(format!("failed to read {}: {e}", path.display())))?;

    let loaded = parse_config(&text);
    info!(
        path = %path.display(),
        rules = loaded.registry.len(),
        skipped = loaded.skipped.len(),
        "configuration loaded"
    );
    Ok(loaded)
}

/// Parses configuration text.
#[must_use]
pub fn parse_config(text: &str) -> LoadedConfig {
    let mut loaded = LoadedConfig::default();
    let mut section = Section::Unknown;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = Section::parse(&line[1..line.len() - 1]);
            if section == Section::Unknown {
                debug!(line = line_no, section = line, "ignoring unknown section");
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            debug!(line = line_no, "ignoring line without '='");
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        match section {
            Section::Monitoring => apply_monitoring(&mut loaded.config, key, value, line_no),
            Section::Notification => apply_notification(&mut loaded.config, key, value),
            Section::Rules => {
                if let Err(e) = add_rule(&mut loaded.registry, key, value, line_no) {
                    warn!(line = line_no, rule = key, error = %e, "skipping rule");
                    loaded.skipped.push(e);
                }
            }
            Section::Unknown => {}
        }
    }

    loaded
}

fn apply_monitoring(config: &mut WatchConfig, key: &str, value: &str, line_no: usize) {
    if key.eq_ignore_ascii_case("Log_File_Path") {
        config.log_file_path = (!value.is_empty()).then(|| value.into());
    } else if key.eq_ignore_ascii_case("Monitor_Interval") {
        config.poll_interval = parse_seconds(key, value, DEFAULT_POLL_INTERVAL, line_no);
    } else if key.eq_ignore_ascii_case("Join_Timeout") {
        config.join_timeout = parse_seconds(key, value, DEFAULT_JOIN_TIMEOUT, line_no);
    } else if key.eq_ignore_ascii_case("History_Capacity") {
        match value.parse::<usize>() {
            Ok(capacity) => config.history_capacity = capacity,
            Err(_) => warn!(line = line_no, value, "invalid History_Capacity, keeping default"),
        }
    } else if key.eq_ignore_ascii_case("Dispatch_Queue") {
        match value.parse::<usize>() {
            Ok(0) => config.dispatch = DispatchMode::Inline,
            Ok(capacity) => config.dispatch = DispatchMode::Queued { capacity },
            Err(_) => warn!(line = line_no, value, "invalid Dispatch_Queue, using inline dispatch"),
        }
    } else if key.eq_ignore_ascii_case("Enable_Stdout_Capture") {
        if is_truthy(value) {
            warn!(line = line_no, "Enable_Stdout_Capture is not supported, tailing the log file only");
        }
    } else {
        debug!(line = line_no, key, "ignoring unknown monitoring key");
    }
}

fn apply_notification(config: &mut WatchConfig, key: &str, value: &str) {
    if key.eq_ignore_ascii_case("Default_ExtNotify") {
        config.preferred_notifier = (!value.is_empty()).then(|| value.to_ascii_lowercase());
    } else if !value.is_empty() {
        config
            .notification_settings
            .insert(key.to_string(), value.to_string());
    }
}

fn parse_seconds(key: &str, value: &str, default: Duration, line_no: usize) -> Duration {
    match value.parse::<f64>().ok().filter(|s| *s > 0.0) {
        Some(secs) => Duration::try_from_secs_f64(secs).unwrap_or(default),
        None => {
            warn!(
                line = line_no,
                key,
                value,
                default_secs = default.as_secs_f64(),
                "invalid duration, using default"
            );
            default
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn add_rule(registry: &mut RuleRegistry, name: &str, value: &str, line_no: usize) -> Result<(), ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedRule { line: line_no, reason };

    let rule = parse_rule(name, value).map_err(malformed)?;
    registry
        .insert(rule)
        .map_err(|e| malformed(e.to_string()))
}

/// Parses one rule value. Errors are plain reasons; the caller adds the line.
fn parse_rule(name: &str, value: &str) -> Result<RuleDefinition, String> {
    let body = value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value);
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();

    if parts.len() < 3 {
        return Err(format!(
            "expected at least start, timeout and target, got {} part(s)",
            parts.len()
        ));
    }

    let start_node = parts[0];
    let mut steps = Vec::new();
    let mut idx = 1;
    while idx + 1 < parts.len() {
        let Ok(timeout_ms) = parts[idx].parse::<u64>() else {
            break;
        };
        steps.push(Step::new(parts[idx + 1], timeout_ms));
        idx += 2;
    }

    if steps.is_empty() {
        return Err(format!("timeout '{}' is not a non-negative integer", parts[1]));
    }

    let description = parts[idx..].join(", ");
    RuleDefinition::new(name, start_node, steps, description).map_err(|e| e.to_string())
}
