//! Rule definitions and the rule registry.
//!
//! A rule names a start node and an ordered list of steps. Each step names
//! the node expected next and how long the engine waits for it. Rules are
//! validated once at construction and are immutable afterwards; the registry
//! keeps them in insertion order, which is also the order alerts are emitted
//! in when several rules react to the same node.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One expected transition of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Node that satisfies this step.
    pub target_node: String,
    /// Deadline for this step, measured from the previous reset or advance.
    pub timeout_ms: u64,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

impl Step {
    /// Creates a step with an empty description.
    #[must_use]
    pub fn new(target_node: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            target_node: target_node.into(),
            timeout_ms,
            description: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The step deadline as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// An immutable, validated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleDefinition {
    name: String,
    start_node: String,
    steps: Vec<Step>,
    description: String,
}

impl RuleDefinition {
    /// Creates a builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name)
    }

    /// Validates and creates a rule.
    ///
    /// Names and nodes are trimmed. Fails if any name or node is empty, the
    /// step list is empty, or a step has a zero timeout.
    pub fn new(
        name: impl Into<String>,
        start_node: impl Into<String>,
        steps: Vec<Step>,
        description: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::EmptyRuleName);
        }

        let start_node = start_node.into().trim().to_string();
        if start_node.is_empty() {
            return Err(ValidationError::EmptyNode {
                rule: name,
                field: "start_node".to_string(),
            });
        }

        if steps.is_empty() {
            return Err(ValidationError::NoSteps { rule: name });
        }

        let mut normalized = Vec::with_capacity(steps.len());
        for (idx, step) in steps.into_iter().enumerate() {
            let target_node = step.target_node.trim().to_string();
            if target_node.is_empty() {
                return Err(ValidationError::EmptyNode {
                    rule: name,
                    field: format!("target_node of step {idx}"),
                });
            }
            if step.timeout_ms == 0 {
                return Err(ValidationError::ZeroTimeout { rule: name, step: idx });
            }
            normalized.push(Step {
                target_node,
                timeout_ms: step.timeout_ms,
                description: step.description,
            });
        }

        Ok(Self {
            name,
            start_node,
            steps: normalized,
            description: description.into(),
        })
    }

    /// Rule name (unique within a registry).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node that activates or resets this rule.
    #[must_use]
    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    /// Ordered steps; never empty.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step at `index`, if any.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Free-text description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// True for single-step rules whose target is their own start node.
    ///
    /// These rules only ever reset or time out.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.steps.len() == 1 && self.steps[0].target_node == self.start_node
    }
}

impl fmt::Display for RuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.start_node)?;
        for step in &self.steps {
            write!(f, " -({}ms)-> {}", step.timeout_ms, step.target_node)?;
        }
        Ok(())
    }
}

/// Builder for [`RuleDefinition`].
#[derive(Debug, Clone, Default)]
pub struct RuleBuilder {
    name: String,
    start_node: Option<String>,
    steps: Vec<Step>,
    description: String,
}

impl RuleBuilder {
    /// Creates a builder for a rule with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the start node.
    #[must_use]
    pub fn start(mut self, node: impl Into<String>) -> Self {
        self.start_node = Some(node.into());
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, target_node: impl Into<String>, timeout_ms: u64) -> Self {
        self.steps.push(Step::new(target_node, timeout_ms));
        self
    }

    /// Appends a fully specified step.
    #[must_use]
    pub fn push_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builds the rule.
    /// Returns `ValidationError` if required fields are missing or invalid.
    pub fn build(self) -> Result<RuleDefinition, ValidationError> {
        let name = self.name;
        let start_node = self.start_node.unwrap_or_default();
        RuleDefinition::new(name, start_node, self.steps, self.description)
    }
}

/// Ordered, name-indexed collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<RuleDefinition>,
    by_name: HashMap<String, usize>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from rules, rejecting duplicate names.
    pub fn from_rules(rules: impl IntoIterator<Item = RuleDefinition>) -> Result<Self, ValidationError> {
        let mut registry = Self::new();
        for rule in rules {
            registry.insert(rule)?;
        }
        Ok(registry)
    }

    /// Adds a rule at the end of the iteration order.
    pub fn insert(&mut self, rule: RuleDefinition) -> Result<(), ValidationError> {
        if self.by_name.contains_key(rule.name()) {
            return Err(ValidationError::DuplicateRule {
                name: rule.name().to_string(),
            });
        }
        self.by_name.insert(rule.name().to_string(), self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RuleDefinition> {
        self.by_name.get(name).map(|&idx| &self.rules[idx])
    }

    /// Returns true if a rule with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterates rules in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    /// Rules whose start node is `node`, in registry order.
    pub fn started_by<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a RuleDefinition> + 'a {
        self.rules.iter().filter(move |r| r.start_node == node)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the registry holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleRegistry {
    type Item = &'a RuleDefinition;
    type IntoIter = std::slice::Iter<'a, RuleDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
