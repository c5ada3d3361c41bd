//! Base64 block decoding capability (`file.transform`).
//!
//! Scans file bytes for maximal runs of base64 alphabet characters at
//! least `min_len` long (option, default 64) and decodes them. Failures
//! are strictly per-file: an unreadable source, malformed supplied
//! content, or an undecodable run degrade that one file to an empty
//! action list while the rest of the batch proceeds.

use std::fs;
use std::time::Instant;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::capability::{
    CallResult, Capability, CapabilityHandler, CapabilityMethod, HostSink, elapsed_ms,
};
use crate::error::CallError;
use crate::state::PluginState;

/// Tracing target for transform operations.
const TRANSFORM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transform");

/// Minimal qualifying run length when the `min_len` option is absent.
const DEFAULT_MIN_LEN: u64 = 64;

/// Action marker attached to files with at least one decoded run.
const DECODED_ACTION: &str = "decoded:base64";

/// Decoder for scanned runs. The scanner matches raw byte runs, not
/// pre-validated base64 documents, so padding may be short or absent and
/// the final quantum may carry leftover bits.
static LENIENT: Lazy<GeneralPurpose> = Lazy::new(|| {
    GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new()
            .with_decode_padding_mode(DecodePaddingMode::Indifferent)
            .with_decode_allow_trailing_bits(true),
    )
});

/// Parameters of a `file.transform` call.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TransformParams {
    files: Vec<FileSpec>,
}

/// One file in the batch: content supplied inline or read from the
/// workspace.
#[derive(Debug, Deserialize)]
struct FileSpec {
    path: String,
    content_b64: Option<String>,
}

/// Why a file produced no actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    /// The workspace file could not be read.
    UnreadableSource,
    /// Supplied `content_b64` is not canonical base64.
    MalformedContent,
    /// No qualifying run was found.
    NoBlocks,
    /// A matched run failed to decode even leniently.
    UndecodableBlock,
}

/// Per-file outcome, folded into the wire shape after the batch runs.
#[derive(Debug, PartialEq, Eq)]
enum FileOutcome {
    /// At least one run decoded; carries the re-encoded concatenation.
    Decoded { blocks: usize, content_b64: String },
    /// Nothing decoded; the file reports `actions: []`.
    Skipped(SkipReason),
}

#[derive(Debug, Serialize)]
struct FileReport {
    path: String,
    actions: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<Vec<String>>,
}

impl FileReport {
    fn from_outcome(path: String, outcome: FileOutcome) -> Self {
        match outcome {
            FileOutcome::Decoded { blocks, content_b64 } => Self {
                path,
                actions: vec![DECODED_ACTION],
                content_b64: Some(content_b64),
                notes: Some(vec![format!("blocks:{blocks}")]),
            },
            FileOutcome::Skipped(reason) => {
                debug!(target: TRANSFORM_TARGET, path = %path, ?reason, "file skipped");
                Self {
                    path,
                    actions: Vec::new(),
                    content_b64: None,
                    notes: None,
                }
            }
        }
    }
}

/// Handler for the transform capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformCapability;

impl TransformCapability {
    /// Creates the handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn transform(state: &PluginState, params: &Value) -> CallResult {
        let started = Instant::now();
        let params: TransformParams = if params.is_null() {
            TransformParams::default()
        } else {
            serde_json::from_value(params.clone()).map_err(CallError::invalid_params)?
        };

        let min_len = state.option_u64("min_len").unwrap_or(DEFAULT_MIN_LEN);
        let scanner = run_scanner(min_len).map_err(CallError::invalid_params)?;

        let mut decoded_files = 0usize;
        let mut reports = Vec::with_capacity(params.files.len());
        for spec in params.files {
            let outcome = transform_file(state, &scanner, &spec);
            if matches!(outcome, FileOutcome::Decoded { .. }) {
                decoded_files += 1;
            }
            reports.push(FileReport::from_outcome(spec.path, outcome));
        }

        debug!(
            target: TRANSFORM_TARGET,
            files = reports.len(),
            decoded = decoded_files,
            "transform batch complete"
        );

        Ok(json!({
            "files": reports,
            "metrics": {
                "decoded": decoded_files,
                "ms": elapsed_ms(started),
            },
        }))
    }
}

impl CapabilityHandler for TransformCapability {
    fn capability(&self) -> Capability {
        Capability::Transform
    }

    fn methods(&self) -> &'static [CapabilityMethod] {
        &[CapabilityMethod::FileTransform]
    }

    fn handle(
        &self,
        method: CapabilityMethod,
        state: &mut PluginState,
        _host: &mut dyn HostSink,
        params: &Value,
    ) -> CallResult {
        match method {
            CapabilityMethod::FileTransform => Self::transform(state, params),
            other => Err(CallError::unknown_method(Some(other.as_str()))),
        }
    }
}

/// Builds the run scanner: maximal base64-alphabet runs of at least
/// `min_len` characters, with up to two trailing padding characters.
fn run_scanner(min_len: u64) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"[A-Za-z0-9+/]{{{min_len},}}={{0,2}}"))
}

fn transform_file(state: &PluginState, scanner: &Regex, spec: &FileSpec) -> FileOutcome {
    let bytes = match &spec.content_b64 {
        Some(encoded) => match STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(_) => return FileOutcome::Skipped(SkipReason::MalformedContent),
        },
        None => match fs::read(state.resolve(&spec.path)) {
            Ok(bytes) => bytes,
            Err(_) => return FileOutcome::Skipped(SkipReason::UnreadableSource),
        },
    };

    let mut decoded = Vec::new();
    let mut blocks = 0usize;
    for run in scanner.find_iter(&bytes) {
        match LENIENT.decode(run.as_bytes()) {
            Ok(payload) => {
                decoded.extend_from_slice(&payload);
                blocks += 1;
            }
            Err(_) => return FileOutcome::Skipped(SkipReason::UndecodableBlock),
        }
    }

    if blocks == 0 {
        return FileOutcome::Skipped(SkipReason::NoBlocks);
    }
    FileOutcome::Decoded {
        blocks,
        content_b64: STANDARD.encode(&decoded),
    }
}
