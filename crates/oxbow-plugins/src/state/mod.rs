//! Process-wide plugin state.
//!
//! [`PluginState`] is created once per process, mutated by `plugin.init`
//! (which may be re-entered to refresh the workspace root or merge new
//! options), and destroyed on `plugin.shutdown` or stream close. Handlers
//! receive it by mutable reference; because the dispatch loop handles one
//! request at a time, writers complete before the response line is
//! flushed and every later call observes their effects.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::Capability;

/// Lifecycle phase of the plugin process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No `plugin.init` seen yet; capability calls run against defaults.
    Uninitialized,
    /// Initialised and accepting calls.
    Ready,
    /// `plugin.shutdown` has been answered; no further calls are served.
    Terminated,
}

/// Severity attached to a rule definition.
///
/// Wire form is the uppercase name. Host-supplied finding severities are
/// not funnelled through this enum; they stay opaque strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational or low-impact match.
    #[default]
    Low,
    /// Suspicious pattern worth review.
    Medium,
    /// Likely defect.
    High,
    /// Confirmed dangerous pattern.
    Critical,
}

impl Severity {
    /// Returns the canonical uppercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parses a severity name case-insensitively.
    ///
    /// Unknown names degrade to [`Severity::Low`] rather than failing:
    /// rule payloads come from remote sources whose vocabularies drift.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "MEDIUM" => Self::Medium,
            "HIGH" => Self::High,
            "CRITICAL" => Self::Critical,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One match pattern within a rule.
///
/// Rule files may attach engine-specific keys alongside `pattern`; those
/// survive round trips through the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulePattern {
    pattern: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RulePattern {
    /// Creates a bare pattern.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            extra: Map::new(),
        }
    }

    /// Returns the pattern text.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// A single analysis rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    patterns: Vec<RulePattern>,
}

impl Rule {
    /// Creates a rule.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        patterns: Vec<RulePattern>,
    ) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            severity,
            patterns,
        }
    }

    /// Returns the rule id, unique within a table.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the ordered pattern list.
    #[must_use]
    pub fn patterns(&self) -> &[RulePattern] {
        &self.patterns
    }
}

/// Rule table keyed by rule id.
///
/// Later writers win on id collision, so merge order is the precedence
/// order. Backed by a `BTreeMap`, which keeps `ids()` stable for the
/// process lifetime as `rules.list` requires.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    rules: BTreeMap<String, Rule>,
}

impl RuleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, replacing any existing rule with the same id.
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.id().to_owned(), rule);
    }

    /// Merges a batch of rules in order; each entry overwrites earlier
    /// entries sharing its id.
    pub fn merge(&mut self, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            self.insert(rule);
        }
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    /// Returns the table's current ids.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when the table holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Consumes the table, yielding its rules in id order.
    #[must_use]
    pub fn into_rules(self) -> Vec<Rule> {
        self.rules.into_values().collect()
    }
}

/// Process-wide plugin state owned by the lifecycle controller.
#[derive(Debug)]
pub struct PluginState {
    phase: Phase,
    workspace_root: PathBuf,
    options: Map<String, Value>,
    capabilities: Vec<Capability>,
    rules: RuleTable,
}

impl PluginState {
    /// Creates state for a plugin declaring the given capability set.
    ///
    /// Before `plugin.init` arrives, the workspace root defaults to the
    /// current directory and the options map is empty.
    #[must_use]
    pub fn new(capabilities: Vec<Capability>) -> Self {
        Self {
            phase: Phase::Uninitialized,
            workspace_root: PathBuf::from("."),
            options: Map::new(),
            capabilities,
            rules: RuleTable::new(),
        }
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Applies a `plugin.init` call: replaces the workspace root when one
    /// is supplied and merges options key-by-key. Re-entrant; the rule
    /// table is never reset by a later init.
    pub fn initialise(&mut self, workspace_root: Option<PathBuf>, options: Map<String, Value>) {
        if let Some(root) = workspace_root {
            self.workspace_root = root;
        }
        for (key, value) in options {
            self.options.insert(key, value);
        }
        self.phase = Phase::Ready;
    }

    /// Marks the plugin terminated. Idempotent.
    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolves a possibly-relative path against the workspace root.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace_root.join(candidate)
        }
    }

    /// Returns the merged options map.
    #[must_use]
    pub const fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Returns a string option.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Returns an unsigned integer option.
    #[must_use]
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }

    /// Returns the declared capability set.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Returns the rule table.
    #[must_use]
    pub const fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Returns the rule table for mutation.
    #[must_use]
    pub const fn rules_mut(&mut self) -> &mut RuleTable {
        &mut self.rules
    }
}

#[cfg(test)]
mod tests;
