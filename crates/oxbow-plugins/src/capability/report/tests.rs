//! Unit tests for the report capability.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rstest::rstest;
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::capability::MockHostSink;

struct RecordingSink {
    entries: Vec<(LogLevel, String)>,
}

impl RecordingSink {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }
}

impl HostSink for RecordingSink {
    fn log(&mut self, level: LogLevel, message: &str) {
        self.entries.push((level, message.to_owned()));
    }
}

fn ready_state(root: &Path) -> PluginState {
    let mut state = PluginState::new(vec![Capability::Report]);
    state.initialise(Some(root.to_path_buf()), serde_json::Map::new());
    state
}

fn run_report(state: &mut PluginState, host: &mut dyn HostSink, params: Value) -> Value {
    let handler = ReportCapability::new();
    handler
        .handle(CapabilityMethod::ScanReport, state, host, &params)
        .expect("report call succeeds")
}

/// Decodes the returned document into text for substring assertions; the
/// report lines land verbatim inside the content streams.
fn document_text(result: &Value) -> String {
    let encoded = result
        .pointer("/report_content")
        .and_then(Value::as_str)
        .expect("report content present");
    String::from_utf8_lossy(&STANDARD.decode(encoded).expect("valid base64")).into_owned()
}

// ---------------------------------------------------------------------------
// Result shape and document output
// ---------------------------------------------------------------------------

#[test]
fn empty_findings_produce_a_clean_report() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let result = run_report(&mut state, &mut RecordingSink::new(), json!({"findings": []}));

    assert!(result.get("error").is_none());
    assert_eq!(
        result.pointer("/metrics/findings_processed"),
        Some(&json!(0))
    );
    assert_eq!(
        result.pointer("/report_type"),
        Some(&json!("application/pdf"))
    );
    assert!(document_text(&result).contains("No security issues were found"));
}

#[test]
fn document_is_written_to_the_workspace_and_returned_inline() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let result = run_report(&mut state, &mut RecordingSink::new(), json!({"findings": []}));

    let path = result
        .pointer("/report_path")
        .and_then(Value::as_str)
        .expect("report path present");
    assert!(path.ends_with("report.pdf"));

    let on_disk = fs::read(path).expect("document written");
    assert!(on_disk.starts_with(b"%PDF-"));
    let encoded = result
        .pointer("/report_content")
        .and_then(Value::as_str)
        .expect("report content present");
    assert_eq!(STANDARD.decode(encoded).expect("valid base64"), on_disk);
    assert_eq!(
        result.pointer("/metrics/output_size_bytes"),
        Some(&json!(on_disk.len()))
    );
}

#[test]
fn output_option_overrides_the_file_name() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let mut options = serde_json::Map::new();
    options.insert("output".into(), json!("scan-results.pdf"));
    state.initialise(None, options);

    let result = run_report(&mut state, &mut RecordingSink::new(), json!({"findings": []}));
    let path = result
        .pointer("/report_path")
        .and_then(Value::as_str)
        .expect("report path present");
    assert!(path.ends_with("scan-results.pdf"));
    assert!(dir.path().join("scan-results.pdf").is_file());
}

// ---------------------------------------------------------------------------
// Severity grouping
// ---------------------------------------------------------------------------

#[test]
fn severity_percentages_use_one_decimal_place() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let findings: Vec<Value> = ["HIGH", "HIGH", "HIGH", "LOW"]
        .iter()
        .map(|severity| json!({"rule_id": "R", "severity": severity}))
        .collect();
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": findings}),
    );

    let text = document_text(&result);
    assert!(text.contains("High | 3 | 75.0%"), "missing HIGH row");
    assert!(text.contains("Low | 1 | 25.0%"), "missing LOW row");
}

#[test]
fn severity_rows_sort_alphabetically() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let findings = json!([
        {"severity": "MEDIUM"},
        {"severity": "CRITICAL"},
        {"severity": "HIGH"},
    ]);
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": findings}),
    );

    let text = document_text(&result);
    let critical = text.find("Critical | 1").expect("critical row");
    let high = text.find("High | 1").expect("high row");
    let medium = text.find("Medium | 1").expect("medium row");
    assert!(critical < high && high < medium, "rows out of order");
}

// ---------------------------------------------------------------------------
// Detail blocks
// ---------------------------------------------------------------------------

#[test]
fn detail_blocks_preserve_input_order() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let findings = json!([
        {"rule_id": "zz-last-alphabetically", "severity": "LOW"},
        {"rule_id": "aa-first-alphabetically", "severity": "LOW"},
    ]);
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": findings}),
    );

    let text = document_text(&result);
    assert!(text.contains("Finding #1: zz-last-alphabetically"));
    assert!(text.contains("Finding #2: aa-first-alphabetically"));
}

#[test]
fn sparse_findings_render_placeholders() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": [{}]}),
    );

    let text = document_text(&result);
    assert!(text.contains("Finding #1: Unknown Rule"));
    assert!(text.contains("File Path: Unknown Path"));
    assert!(text.contains("Line Number: N/A"));
    assert!(text.contains("Column: N/A"));
    assert!(text.contains("Message: No message provided"));
}

#[test]
fn optional_detail_fields_render_when_supplied() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let finding = json!({
        "rule_id": "R1",
        "excerpt": "eval(user_input)",
        "remediation": "use ast.literal_eval",
        "context": "surrounding code",
    });
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": [finding]}),
    );

    let text = document_text(&result);
    assert!(text.contains("Code Excerpt: eval\\(user_input\\)"));
    assert!(text.contains("Remediation: use ast.literal_eval"));
    assert!(text.contains("Context: surrounding code"));
}

#[rstest]
#[case::number(json!(12), "Line Number: 12")]
#[case::string(json!("12-14"), "Line Number: 12-14")]
fn line_values_render_as_given(#[case] line: Value, #[case] expected: &str) {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": [{"line": line}]}),
    );
    assert!(document_text(&result).contains(expected));
}

#[test]
fn file_paths_relativise_under_the_workspace_root() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let inside = dir.path().join("src").join("main.py");
    let findings = json!([
        {"file": inside.to_string_lossy()},
        {"file": "/elsewhere/deep/other.py"},
    ]);
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": findings}),
    );

    let text = document_text(&result);
    let relative = Path::new("src").join("main.py");
    assert!(text.contains(&format!("File Path: {}", relative.display())));
    assert!(text.contains("File Path: other.py"));
    assert!(!text.contains("/elsewhere/deep"));
}

// ---------------------------------------------------------------------------
// Metrics section and logging
// ---------------------------------------------------------------------------

#[test]
fn supplied_metrics_render_in_the_summary() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let result = run_report(
        &mut state,
        &mut RecordingSink::new(),
        json!({"findings": [], "metrics": {"issues": 7, "ms": 120, "files": 3}}),
    );

    let text = document_text(&result);
    assert!(text.contains("Total Issues Found: 7"));
    assert!(text.contains("Analysis Time: 120ms"));
    assert!(text.contains("Files Analyzed: 3"));
}

#[test]
fn generation_logs_before_and_after() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());

    let mut host = MockHostSink::new();
    let mut order = mockall::Sequence::new();
    host.expect_log()
        .withf(|level, message| {
            *level == LogLevel::Info && message.starts_with("Generating PDF report for 1")
        })
        .times(1)
        .in_sequence(&mut order)
        .return_const(());
    host.expect_log()
        .withf(|level, message| {
            *level == LogLevel::Info && message.starts_with("PDF report generated:")
        })
        .times(1)
        .in_sequence(&mut order)
        .return_const(());

    run_report(&mut state, &mut host, json!({"findings": [{}]}));
}

// ---------------------------------------------------------------------------
// Failure folding
// ---------------------------------------------------------------------------

#[test]
fn write_failure_is_folded_into_the_result() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let mut options = serde_json::Map::new();
    options.insert("output".into(), json!("missing-dir/report.pdf"));
    state.initialise(None, options);

    let mut host = RecordingSink::new();
    let result = run_report(&mut state, &mut host, json!({"findings": []}));

    let message = result
        .get("error")
        .and_then(Value::as_str)
        .expect("error folded into result");
    assert!(message.starts_with("Failed to generate PDF report:"));
    assert!(result.pointer("/metrics/ms").is_some());
    assert!(result.get("report_path").is_none());
    assert!(
        host.entries
            .iter()
            .any(|(level, _)| *level == LogLevel::Error)
    );
}

#[test]
fn invalid_params_type_is_a_protocol_error() {
    let dir = TempDir::new().expect("tempdir");
    let mut state = ready_state(dir.path());
    let handler = ReportCapability::new();
    let error = handler
        .handle(
            CapabilityMethod::ScanReport,
            &mut state,
            &mut RecordingSink::new(),
            &json!({"findings": "nope"}),
        )
        .expect_err("bad params rejected");
    assert!(matches!(error, CallError::InvalidParams { .. }));
}
