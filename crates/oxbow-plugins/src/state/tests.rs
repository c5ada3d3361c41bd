//! Unit tests for plugin state and the rule table.

use std::path::{Path, PathBuf};

use rstest::rstest;
use serde_json::json;

use super::*;

fn options(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), value.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Lifecycle phases
// ---------------------------------------------------------------------------

#[test]
fn new_state_is_uninitialized_with_cwd_root() {
    let state = PluginState::new(vec![Capability::Discover]);
    assert_eq!(state.phase(), Phase::Uninitialized);
    assert_eq!(state.workspace_root(), Path::new("."));
    assert!(state.options().is_empty());
    assert_eq!(state.capabilities(), &[Capability::Discover]);
}

#[test]
fn initialise_moves_to_ready() {
    let mut state = PluginState::new(Vec::new());
    state.initialise(Some(PathBuf::from("/work")), Map::new());
    assert_eq!(state.phase(), Phase::Ready);
    assert_eq!(state.workspace_root(), Path::new("/work"));
}

#[test]
fn reinitialise_merges_options_and_keeps_root() {
    let mut state = PluginState::new(Vec::new());
    state.initialise(
        Some(PathBuf::from("/work")),
        options(&[("min_len", json!(32)), ("output", json!("a.pdf"))]),
    );
    state.initialise(None, options(&[("min_len", json!(16))]));

    assert_eq!(state.workspace_root(), Path::new("/work"));
    assert_eq!(state.option_u64("min_len"), Some(16));
    assert_eq!(state.option_str("output"), Some("a.pdf"));
}

#[test]
fn reinitialise_preserves_the_rule_table() {
    let mut state = PluginState::new(Vec::new());
    state
        .rules_mut()
        .insert(Rule::new("R1", "m", Severity::Low, Vec::new()));
    state.initialise(None, Map::new());
    assert_eq!(state.rules().len(), 1);
}

#[test]
fn terminate_is_idempotent() {
    let mut state = PluginState::new(Vec::new());
    state.terminate();
    state.terminate();
    assert_eq!(state.phase(), Phase::Terminated);
}

// ---------------------------------------------------------------------------
// Path resolution and typed options
// ---------------------------------------------------------------------------

#[rstest]
#[case::relative("sub/file.py", "/work/sub/file.py")]
#[case::absolute("/etc/passwd", "/etc/passwd")]
#[case::dot(".", "/work/.")]
fn resolve_joins_relative_paths_only(#[case] input: &str, #[case] expected: &str) {
    let mut state = PluginState::new(Vec::new());
    state.initialise(Some(PathBuf::from("/work")), Map::new());
    assert_eq!(state.resolve(input), PathBuf::from(expected));
}

#[test]
fn typed_option_accessors_reject_mismatched_types() {
    let mut state = PluginState::new(Vec::new());
    state.initialise(
        None,
        options(&[("name", json!("report")), ("depth", json!(3))]),
    );
    assert_eq!(state.option_str("name"), Some("report"));
    assert!(state.option_str("depth").is_none());
    assert_eq!(state.option_u64("depth"), Some(3));
    assert!(state.option_u64("name").is_none());
    assert!(state.option_str("absent").is_none());
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[rstest]
#[case("low", Severity::Low)]
#[case("MEDIUM", Severity::Medium)]
#[case("High", Severity::High)]
#[case("CRITICAL", Severity::Critical)]
#[case("whatever", Severity::Low)]
#[case("", Severity::Low)]
fn severity_parses_leniently(#[case] input: &str, #[case] expected: Severity) {
    assert_eq!(Severity::parse_lenient(input), expected);
}

#[test]
fn severity_serialises_uppercase() {
    assert_eq!(json!(Severity::Critical), json!("CRITICAL"));
    assert_eq!(Severity::Medium.to_string(), "MEDIUM");
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

#[test]
fn insert_replaces_on_id_collision() {
    let mut table = RuleTable::new();
    table.insert(Rule::new("R1", "first", Severity::Low, Vec::new()));
    table.insert(Rule::new("R1", "second", Severity::High, Vec::new()));

    assert_eq!(table.len(), 1);
    let rule = table.get("R1").expect("R1 present");
    assert_eq!(rule.message(), "second");
    assert_eq!(rule.severity(), Severity::High);
}

#[test]
fn ids_are_sorted_and_stable() {
    let mut table = RuleTable::new();
    for id in ["zeta", "alpha", "mid"] {
        table.insert(Rule::new(id, "m", Severity::Low, Vec::new()));
    }
    assert_eq!(table.ids(), vec!["alpha", "mid", "zeta"]);
    assert_eq!(table.ids(), table.ids());
}

#[test]
fn merge_applies_batch_in_order() {
    let mut table = RuleTable::new();
    table.merge(vec![
        Rule::new("R1", "first", Severity::Low, Vec::new()),
        Rule::new("R2", "only", Severity::Low, Vec::new()),
        Rule::new("R1", "last", Severity::Medium, Vec::new()),
    ]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("R1").expect("R1").message(), "last");
}

#[test]
fn into_rules_yields_id_order() {
    let mut table = RuleTable::new();
    table.insert(Rule::new("b", "m", Severity::Low, Vec::new()));
    table.insert(Rule::new("a", "m", Severity::Low, Vec::new()));
    let ids: Vec<String> = table
        .into_rules()
        .into_iter()
        .map(|rule| rule.id().to_owned())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[test]
fn rule_round_trips_through_yaml_with_pattern_extras() {
    let text = "id: R1\nmessage: msg\nseverity: HIGH\npatterns:\n  - pattern: eval\n    flags: i\n";
    let rule: Rule = serde_yaml::from_str(text).expect("parse rule");
    assert_eq!(rule.severity(), Severity::High);
    assert_eq!(rule.patterns()[0].pattern(), "eval");

    let rendered = serde_yaml::to_string(&rule).expect("render rule");
    assert!(rendered.contains("flags: i"), "extras survive: {rendered}");
}
