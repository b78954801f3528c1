//! Node extraction from raw log lines.
//!
//! The extractor applies an ordered list of regular expressions to each line.
//! The first pattern that matches wins and its first capture group becomes the
//! node name. Specific patterns (start and complete markers) come before the
//! generic `[node_name=...]` pattern so a line that matches both is classified
//! by the specific one.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default pattern for lines announcing that a node started.
pub const DEFAULT_START_PATTERN: &str = r"\[.*?\]\[.*?\]\[.*?\] \[node_name=(.*?)\].*start";

/// Default pattern for lines announcing that a node completed.
pub const DEFAULT_COMPLETE_PATTERN: &str = r"\[.*?\]\[.*?\] \[node_name=(.*?)\].*complete";

/// Default pattern for any line referencing a node.
pub const DEFAULT_GENERIC_PATTERN: &str = r"\[.*?\] \[node_name=(.*?)\]";

/// Classification of the pattern that produced a node event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Node start marker.
    Start,
    /// Node completion marker.
    Complete,
    /// Any other node reference.
    Generic,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Complete => write!(f, "complete"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// A compiled node pattern.
#[derive(Debug, Clone)]
pub struct NodePattern {
    kind: PatternKind,
    regex: Regex,
}

impl NodePattern {
    /// Compiles a case-insensitive pattern.
    ///
    /// The pattern must contain at least one capture group; group 1 is the
    /// node name.
    pub fn new(kind: PatternKind, pattern: &str) -> Result<Self, ValidationError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ValidationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        if regex.captures_len() < 2 {
            return Err(ValidationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern must capture the node name in group 1".to_string(),
            });
        }

        Ok(Self { kind, regex })
    }

    /// Pattern classification.
    #[must_use]
    pub const fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Source text of the pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    fn capture<'a>(&self, line: &'a str) -> Option<&'a str> {
        let caps = self.regex.captures(line)?;
        let node = caps.get(1)?.as_str().trim();
        (!node.is_empty()).then_some(node)
    }
}

/// A node observed on a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    /// Node name.
    pub node: String,
    /// Which pattern matched.
    pub kind: PatternKind,
}

/// Ordered first-match-wins node extractor.
#[derive(Debug, Clone)]
pub struct EventExtractor {
    patterns: Vec<NodePattern>,
}

impl EventExtractor {
    /// Creates an extractor from an ordered pattern list.
    #[must_use]
    pub fn new(patterns: Vec<NodePattern>) -> Self {
        Self { patterns }
    }

    /// Compiles `(kind, pattern)` pairs in order.
    pub fn from_patterns<'a>(
        patterns: impl IntoIterator<Item = (PatternKind, &'a str)>,
    ) -> Result<Self, ValidationError> {
        let patterns = patterns
            .into_iter()
            .map(|(kind, pattern)| NodePattern::new(kind, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(patterns))
    }

    /// Extracts the node referenced by `line`, if any.
    #[must_use]
    pub fn extract(&self, line: &str) -> Option<NodeEvent> {
        self.patterns.iter().find_map(|pattern| {
            pattern.capture(line).map(|node| NodeEvent {
                node: node.to_string(),
                kind: pattern.kind,
            })
        })
    }

    /// Patterns in evaluation order.
    #[must_use]
    pub fn patterns(&self) -> &[NodePattern] {
        &self.patterns
    }
}

impl Default for EventExtractor {
    fn default() -> Self {
        let defaults = [
            (PatternKind::Start, DEFAULT_START_PATTERN),
            (PatternKind::Complete, DEFAULT_COMPLETE_PATTERN),
            (PatternKind::Generic, DEFAULT_GENERIC_PATTERN),
        ];
        let patterns = defaults
            .iter()
            .filter_map(|(kind, pattern)| NodePattern::new(*kind, pattern).ok())
            .collect();
        Self { patterns }
    }
}
