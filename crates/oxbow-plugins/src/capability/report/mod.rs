//! Findings report capability (`scan.report`).
//!
//! Renders a findings list into a PDF document: an executive summary with
//! a severity breakdown table, an analysis metrics section, and one
//! detail block per finding in input order. The document is written to
//! the workspace and returned inline. A write failure is a handler-level
//! failure, folded into the result as `{error, metrics}` so the host
//! keeps the call correlation.

mod pdf;

use std::collections::BTreeMap;
use std::fs;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::warn;

use oxbow_proto::LogLevel;

use crate::capability::{
    CallResult, Capability, CapabilityHandler, CapabilityMethod, HostSink, elapsed_ms,
};
use crate::error::CallError;
use crate::state::PluginState;

/// Tracing target for report operations.
const REPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::report");

/// Output file name when the `output` option is absent.
const DEFAULT_OUTPUT: &str = "report.pdf";
/// MIME type of the produced document.
const REPORT_TYPE: &str = "application/pdf";

const UNKNOWN_RULE: &str = "Unknown Rule";
const UNKNOWN_PATH: &str = "Unknown Path";
const UNKNOWN_SEVERITY: &str = "unknown";

/// Parameters of a `scan.report` call.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReportParams {
    findings: Vec<Finding>,
    metrics: Map<String, Value>,
}

/// One host-supplied finding. Every field is optional; the renderer
/// substitutes placeholders rather than rejecting sparse findings.
/// `line` and `column` stay untyped because hosts send numbers or
/// strings interchangeably.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Finding {
    rule_id: Option<String>,
    severity: Option<String>,
    message: Option<String>,
    file: Option<String>,
    line: Option<Value>,
    column: Option<Value>,
    excerpt: Option<String>,
    remediation: Option<String>,
    context: Option<String>,
}

impl Finding {
    fn severity(&self) -> &str {
        self.severity.as_deref().unwrap_or(UNKNOWN_SEVERITY)
    }

    fn rule_id(&self) -> &str {
        self.rule_id.as_deref().unwrap_or(UNKNOWN_RULE)
    }
}

/// Handler for the report capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportCapability;

impl ReportCapability {
    /// Creates the handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn report(state: &PluginState, host: &mut dyn HostSink, params: &Value) -> CallResult {
        let started = Instant::now();
        let params: ReportParams = if params.is_null() {
            ReportParams::default()
        } else {
            serde_json::from_value(params.clone()).map_err(CallError::invalid_params)?
        };

        host.log(
            LogLevel::Info,
            &format!("Generating PDF report for {} findings", params.findings.len()),
        );

        let output = state.option_str("output").unwrap_or(DEFAULT_OUTPUT);
        let path = state.workspace_root().join(output);
        let lines = document_lines(state, &params.findings, &params.metrics);
        let bytes = pdf::render(&lines);

        match fs::write(&path, &bytes) {
            Ok(()) => {
                let path_display = path.display().to_string();
                host.log(
                    LogLevel::Info,
                    &format!("PDF report generated: {path_display}"),
                );
                Ok(json!({
                    "report_path": path_display,
                    "report_content": STANDARD.encode(&bytes),
                    "report_type": REPORT_TYPE,
                    "metrics": {
                        "findings_processed": params.findings.len(),
                        "output_size_bytes": bytes.len(),
                        "ms": elapsed_ms(started),
                    },
                }))
            }
            Err(error) => {
                let message = format!("Failed to generate PDF report: {error}");
                warn!(target: REPORT_TARGET, path = %path.display(), %error, "report write failed");
                host.log(LogLevel::Error, &message);
                Ok(json!({
                    "error": message,
                    "metrics": { "ms": elapsed_ms(started) },
                }))
            }
        }
    }
}

impl CapabilityHandler for ReportCapability {
    fn capability(&self) -> Capability {
        Capability::Report
    }

    fn methods(&self) -> &'static [CapabilityMethod] {
        &[CapabilityMethod::ScanReport]
    }

    fn handle(
        &self,
        method: CapabilityMethod,
        state: &mut PluginState,
        host: &mut dyn HostSink,
        params: &Value,
    ) -> CallResult {
        match method {
            CapabilityMethod::ScanReport => Self::report(state, host, params),
            other => Err(CallError::unknown_method(Some(other.as_str()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Document composition
// ---------------------------------------------------------------------------

/// Composes the report text, one string per rendered line.
fn document_lines(
    state: &PluginState,
    findings: &[Finding],
    metrics: &Map<String, Value>,
) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(String::from("Oxbow Static Analysis Report"));
    lines.push(String::new());
    lines.push(format!("Generated on: {}", report_date()));
    lines.push(format!(
        "Workspace: {}",
        state.workspace_root().display()
    ));
    lines.push(String::new());

    summary_lines(findings, &mut lines);
    metrics_lines(findings.len(), metrics, &mut lines);
    findings_lines(state, findings, &mut lines);

    lines
}

/// Executive summary with the severity breakdown table. Severities group
/// by their raw wire value and list in ascending alphabetical order.
fn summary_lines(findings: &[Finding], lines: &mut Vec<String>) {
    lines.push(String::from("Executive Summary"));
    lines.push(format!(
        "This analysis identified {} potential issues across the codebase.",
        findings.len()
    ));
    lines.push(String::new());

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.severity()).or_default() += 1;
    }
    if counts.is_empty() {
        return;
    }

    lines.push(String::from("Severity | Count | Percentage"));
    for (severity, count) in &counts {
        lines.push(format!(
            "{} | {} | {}",
            title_case(severity),
            count,
            percentage(*count, findings.len())
        ));
    }
    lines.push(String::new());
}

fn metrics_lines(total: usize, metrics: &Map<String, Value>, lines: &mut Vec<String>) {
    if metrics.is_empty() {
        return;
    }
    lines.push(String::from("Analysis Metrics"));
    lines.push(format!(
        "Total Issues Found: {}",
        metrics.get("issues").map_or_else(|| total.to_string(), render_value)
    ));
    lines.push(format!(
        "Analysis Time: {}ms",
        metrics.get("ms").map_or_else(|| String::from("0"), render_value)
    ));
    lines.push(format!(
        "Files Analyzed: {}",
        metrics.get("files").map_or_else(|| String::from("N/A"), render_value)
    ));
    lines.push(String::new());
}

/// One detail block per finding, input order preserved.
fn findings_lines(state: &PluginState, findings: &[Finding], lines: &mut Vec<String>) {
    lines.push(String::from("Detailed Findings"));

    if findings.is_empty() {
        lines.push(String::from(
            "No security issues were found during the analysis.",
        ));
        return;
    }

    for (index, finding) in findings.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("Finding #{}: {}", index + 1, finding.rule_id()));
        lines.push(format!("Severity: {}", title_case(finding.severity())));
        lines.push(format!("File Path: {}", display_path(state, finding)));
        lines.push(format!("Line Number: {}", cell(finding.line.as_ref())));
        lines.push(format!("Column: {}", cell(finding.column.as_ref())));
        lines.push(format!(
            "Message: {}",
            finding.message.as_deref().unwrap_or("No message provided")
        ));
        if let Some(excerpt) = &finding.excerpt {
            lines.push(format!("Code Excerpt: {excerpt}"));
        }
        if let Some(remediation) = &finding.remediation {
            lines.push(format!("Remediation: {remediation}"));
        }
        if let Some(context) = &finding.context {
            lines.push(format!("Context: {context}"));
        }
    }
}

/// The finding's file, workspace-relative when the root is a prefix,
/// basename-only for other concrete paths.
fn display_path(state: &PluginState, finding: &Finding) -> String {
    let Some(file) = finding.file.as_deref() else {
        return UNKNOWN_PATH.to_owned();
    };
    let path = std::path::Path::new(file);
    if let Ok(relative) = path.strip_prefix(state.workspace_root()) {
        return relative.display().to_string();
    }
    path.file_name()
        .map_or_else(|| file.to_owned(), |name| name.to_string_lossy().into_owned())
}

/// Renders a line/column value: strings verbatim, other values as JSON,
/// absent as `N/A`.
fn cell(value: Option<&Value>) -> String {
    value.map_or_else(|| String::from("N/A"), render_value)
}

fn render_value(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_owned)
}

/// Percentage of `count` over `total`, one decimal place, `0.0%` when the
/// total is zero.
fn percentage(count: usize, total: usize) -> String {
    if total == 0 {
        return String::from("0.0%");
    }
    let ratio = count as f64 / total as f64 * 100.0;
    format!("{ratio:.1}%")
}

/// First letter of each word uppercased, the rest lowercased.
fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn report_date() -> String {
    let now = OffsetDateTime::now_utc();
    let format = format_description!("[month repr:long] [day padding:none], [year]");
    now.format(&format)
        .unwrap_or_else(|_| now.date().to_string())
}

#[cfg(test)]
mod tests;
