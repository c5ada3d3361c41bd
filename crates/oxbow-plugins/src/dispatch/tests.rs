//! Session-level tests for the dispatch loop.

use std::io::{self, Cursor, ErrorKind, Write};

use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::capability::{
    DiscoverCapability, NullSink, ReportCapability, RulesCapability, TransformCapability,
};

fn full_plugin() -> Plugin {
    Plugin::new(
        "0.1.0",
        vec![
            Box::new(DiscoverCapability::new()),
            Box::new(RulesCapability::new()),
            Box::new(TransformCapability::new()),
            Box::new(ReportCapability::new()),
        ],
    )
}

/// Runs a whole session over in-memory streams and returns the parsed
/// output lines.
fn session(plugin: &mut Plugin, lines: &[String]) -> Vec<Value> {
    let input = lines.join("\n");
    let mut output = Vec::new();
    run(plugin, Cursor::new(input), &mut output).expect("session runs");
    String::from_utf8(output)
        .expect("utf-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid output line"))
        .collect()
}

fn init_line(root: &TempDir) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "plugin.init",
        "params": {"workspace_root": root.path().to_string_lossy()},
    })
    .to_string()
}

fn request(id: u64, method: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": {}}).to_string()
}

/// Responses only, with any `plugin.log` notification lines filtered out.
fn responses(output: &[Value]) -> Vec<&Value> {
    output
        .iter()
        .filter(|line| line.get("method").is_none())
        .collect()
}

// ---------------------------------------------------------------------------
// Request/response correlation
// ---------------------------------------------------------------------------

#[test]
fn each_identified_request_gets_exactly_one_response() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let output = session(
        &mut plugin,
        &[
            init_line(&dir),
            request(2, "plugin.ping"),
            request(3, "plugin.shutdown"),
        ],
    );

    let answers = responses(&output);
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0].get("id"), Some(&json!(1)));
    assert_eq!(answers[1].pointer("/result/pong"), Some(&json!(true)));
    assert_eq!(answers[2].pointer("/result/ok"), Some(&json!(true)));
    for answer in answers {
        assert!(
            answer.get("result").is_some() != answer.get("error").is_some(),
            "result xor error: {answer}"
        );
    }
}

#[test]
fn init_reports_declared_capabilities() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let output = session(&mut plugin, &[init_line(&dir), request(2, "plugin.shutdown")]);

    let init_response = responses(&output)[0].clone();
    assert_eq!(
        init_response.pointer("/result/capabilities"),
        Some(&json!(["discover", "rules", "transform", "report"]))
    );
    assert_eq!(
        init_response.pointer("/result/plugin_version"),
        Some(&json!("0.1.0"))
    );
}

#[test]
fn null_id_requests_execute_but_are_never_answered() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let notification =
        json!({"jsonrpc": "2.0", "id": null, "method": "plugin.ping", "params": {}}).to_string();
    let output = session(
        &mut plugin,
        &[init_line(&dir), notification, request(3, "plugin.ping")],
    );

    let answers = responses(&output);
    assert_eq!(answers.len(), 2, "no response for the null-id call");
    assert_eq!(answers[1].get("id"), Some(&json!(3)));
}

// ---------------------------------------------------------------------------
// Error routing
// ---------------------------------------------------------------------------

#[test]
fn unknown_method_errors_and_keeps_the_loop_alive() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let output = session(
        &mut plugin,
        &[
            init_line(&dir),
            request(2, "bogus.method"),
            request(3, "plugin.ping"),
        ],
    );

    let answers = responses(&output);
    assert_eq!(answers[1].pointer("/error/code"), Some(&json!(-32601)));
    assert_eq!(
        answers[1].pointer("/error/data/method"),
        Some(&json!("bogus.method"))
    );
    assert_eq!(answers[2].pointer("/result/pong"), Some(&json!(true)));
}

#[test]
fn missing_method_member_is_unknown_method_without_data() {
    let mut plugin = full_plugin();
    let line = json!({"jsonrpc": "2.0", "id": 1, "params": {}}).to_string();
    let output = session(&mut plugin, &[line]);

    let answers = responses(&output);
    assert_eq!(answers[0].pointer("/error/code"), Some(&json!(-32601)));
    assert!(answers[0].pointer("/error/data").is_none());
}

#[test]
fn undeclared_capability_method_is_unknown() {
    let mut plugin = Plugin::new("0.1.0", vec![Box::new(DiscoverCapability::new())]);
    let output = session(&mut plugin, &[request(1, "rules.list")]);

    assert_eq!(
        responses(&output)[0].pointer("/error/code"),
        Some(&json!(-32601))
    );
}

#[test]
fn invalid_params_surface_their_own_code() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let line = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "rules.get",
        "params": {"id": 7},
    })
    .to_string();
    let output = session(&mut plugin, &[init_line(&dir), line]);

    assert_eq!(
        responses(&output)[1].pointer("/error/code"),
        Some(&json!(-32602))
    );
}

#[test]
fn malformed_lines_are_dropped_without_a_response() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let output = session(
        &mut plugin,
        &[
            String::from("{not json"),
            String::from("\"just a string\""),
            String::new(),
            init_line(&dir),
        ],
    );

    let answers = responses(&output);
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].get("id"), Some(&json!(1)));
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

#[test]
fn shutdown_stops_reading_further_requests() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let output = session(
        &mut plugin,
        &[
            init_line(&dir),
            request(2, "plugin.shutdown"),
            request(3, "plugin.ping"),
        ],
    );

    let answers = responses(&output);
    assert_eq!(answers.len(), 2, "nothing answered after shutdown");
    assert_eq!(answers[1].pointer("/result/ok"), Some(&json!(true)));
}

#[test]
fn dispatch_after_termination_reports_the_terminated_code() {
    let mut plugin = full_plugin();
    plugin
        .dispatch(Some("plugin.shutdown"), &Value::Null, &mut NullSink)
        .expect("shutdown succeeds");

    let error = plugin
        .dispatch(Some("plugin.ping"), &Value::Null, &mut NullSink)
        .expect_err("terminated plugin rejects calls");
    assert_eq!(error.into_error_object().code(), -32002);
}

#[test]
fn broken_output_pipe_ends_the_session_silently() {
    struct BrokenPipe;
    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::BrokenPipe, "parent gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut plugin = full_plugin();
    let input = request(1, "plugin.ping");
    run(&mut plugin, Cursor::new(input), BrokenPipe).expect("broken pipe is not an error");
}

#[test]
fn other_output_failures_propagate() {
    struct Failing;
    impl Write for Failing {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut plugin = full_plugin();
    let input = request(1, "plugin.ping");
    let error = run(&mut plugin, Cursor::new(input), Failing).expect_err("failure surfaces");
    assert_eq!(error.kind(), ErrorKind::Other);
}

// ---------------------------------------------------------------------------
// Host notifications
// ---------------------------------------------------------------------------

#[test]
fn handler_log_notifications_precede_the_response() {
    let dir = TempDir::new().expect("tempdir");
    let mut plugin = full_plugin();
    let report = json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "scan.report",
        "params": {"findings": []},
    })
    .to_string();
    let output = session(&mut plugin, &[init_line(&dir), report]);

    let logs: Vec<&Value> = output
        .iter()
        .filter(|line| line.get("method") == Some(&json!("plugin.log")))
        .collect();
    assert!(logs.len() >= 2, "expected generation logs, got {output:?}");
    assert_eq!(logs[0].pointer("/params/level"), Some(&json!("info")));

    let last = output.last().expect("output not empty");
    assert!(
        last.pointer("/result/report_path").is_some(),
        "response is the final line: {last}"
    );
}
