//! Rule table capability (`rules.list`, `rules.get`).
//!
//! The table is populated during `plugin.init` from three sources, merged
//! in precedence order (later writers overwrite earlier ones on id
//! collision):
//!
//! 1. static rule definitions from YAML files in the rules directory;
//! 2. a single rule injected from `OXBOW_RULE_ID`/`OXBOW_RULE_PATTERN`;
//! 3. rules fetched from a remote source configured via the `rules_url`
//!    option (alias `url`) or `OXBOW_RULES_URL`.
//!
//! Remote payloads arrive in one of three shapes, decoded by an explicit
//! [`RulePayload`] parse: a catalogue object with a `rules` list, a flat
//! list of bare pattern strings, or an object with `banned_tokens`.
//! Fetched rules are persisted to a generated rule file as a durability
//! side effect. Every failure along the way (network, status, parse,
//! persistence) degrades to "those rules are absent"; `plugin.init`
//! itself never fails for it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use oxbow_proto::LogLevel;

use crate::capability::{CallResult, Capability, CapabilityHandler, CapabilityMethod, HostSink};
use crate::error::CallError;
use crate::state::{PluginState, Rule, RulePattern, RuleTable, Severity};

/// Tracing target for rule-table operations.
const RULES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rules");

/// Environment override: id of an injected rule.
pub const ENV_RULE_ID: &str = "OXBOW_RULE_ID";
/// Environment override: pattern of the injected rule.
pub const ENV_RULE_PATTERN: &str = "OXBOW_RULE_PATTERN";
/// Environment override: message of the injected rule.
pub const ENV_RULE_MESSAGE: &str = "OXBOW_RULE_MESSAGE";
/// Environment override: severity of the injected rule.
pub const ENV_RULE_SEVERITY: &str = "OXBOW_RULE_SEVERITY";
/// Environment fallback for the remote rule source URL.
pub const ENV_RULES_URL: &str = "OXBOW_RULES_URL";

/// File name fetched rules are persisted under, inside the rules directory.
const GENERATED_RULES_FILE: &str = "generated.from_url.yaml";
/// Default rules directory, relative to the workspace root.
const DEFAULT_RULES_DIR: &str = "rules";
/// Remote fetch timeout; `plugin.init` blocks for at most this long.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// On-disk rule file shape: `{rules: [...]}`.
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Serialize)]
struct RuleFileOut<'a> {
    rules: &'a [Rule],
}

/// Parameters of a `rules.get` call.
#[derive(Debug, Deserialize)]
struct GetParams {
    id: String,
}

/// Handler for the rules capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct RulesCapability;

impl RulesCapability {
    /// Creates the handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn list(state: &PluginState) -> CallResult {
        Ok(json!({ "ids": state.rules().ids() }))
    }

    fn get(state: &PluginState, params: &Value) -> CallResult {
        let params: GetParams =
            serde_json::from_value(params.clone()).map_err(CallError::invalid_params)?;
        state.rules().get(&params.id).map_or_else(
            || Err(CallError::RuleNotFound { id: params.id.clone() }),
            |rule| Ok(json!({ "rule": rule })),
        )
    }
}

impl CapabilityHandler for RulesCapability {
    fn capability(&self) -> Capability {
        Capability::Rules
    }

    fn methods(&self) -> &'static [CapabilityMethod] {
        &[CapabilityMethod::RulesList, CapabilityMethod::RulesGet]
    }

    fn initialise(&self, state: &mut PluginState, host: &mut dyn HostSink) {
        let dir = rules_dir(state);
        let mut table = RuleTable::new();

        load_rule_files(&dir, &mut table);

        if let Some(rule) = environment_rule(|key| std::env::var(key).ok()) {
            debug!(target: RULES_TARGET, id = rule.id(), "injected environment rule");
            table.insert(rule);
        }

        if let Some(url) = remote_url(state, |key| std::env::var(key).ok()) {
            if let Some(payload) = fetch_payload(&url) {
                let fetched = RulePayload::decode(&payload).map_or_else(Vec::new, RulePayload::into_rules);
                if fetched.is_empty() {
                    debug!(target: RULES_TARGET, url = %url, "remote payload produced no rules");
                } else {
                    persist_rules(&dir, &fetched);
                    host.log(
                        LogLevel::Info,
                        &format!("merged {} remote rules from {url}", fetched.len()),
                    );
                    table.merge(fetched);
                }
            }
        }

        state.rules_mut().merge(table.into_rules());
    }

    fn handle(
        &self,
        method: CapabilityMethod,
        state: &mut PluginState,
        _host: &mut dyn HostSink,
        params: &Value,
    ) -> CallResult {
        match method {
            CapabilityMethod::RulesList => Self::list(state),
            CapabilityMethod::RulesGet => Self::get(state, params),
            other => Err(CallError::unknown_method(Some(other.as_str()))),
        }
    }
}

/// The rules directory: `rules_dir` option resolved against the workspace
/// root, defaulting to `rules`.
fn rules_dir(state: &PluginState) -> PathBuf {
    let dir = state.option_str("rules_dir").unwrap_or(DEFAULT_RULES_DIR);
    state.resolve(dir)
}

/// Loads every `*.yaml`/`*.yml` file in the directory, in name order.
/// Unparseable files are skipped with a warning; the rest still load.
fn load_rule_files(dir: &Path, table: &mut RuleTable) {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(target: RULES_TARGET, dir = %dir.display(), "no rules directory");
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    for path in paths {
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }
        let Ok(text) = fs::read_to_string(&path) else {
            warn!(target: RULES_TARGET, path = %path.display(), "unreadable rule file");
            continue;
        };
        match serde_yaml::from_str::<RuleFile>(&text) {
            Ok(file) => table.merge(file.rules),
            Err(error) => {
                warn!(
                    target: RULES_TARGET,
                    path = %path.display(),
                    %error,
                    "skipping unparseable rule file"
                );
            }
        }
    }
}

/// Builds the environment-injected rule when both an id and a pattern are
/// supplied.
fn environment_rule(get: impl Fn(&str) -> Option<String>) -> Option<Rule> {
    let id = get(ENV_RULE_ID).filter(|value| !value.is_empty())?;
    let pattern = get(ENV_RULE_PATTERN).filter(|value| !value.is_empty())?;
    let message = get(ENV_RULE_MESSAGE)
        .unwrap_or_else(|| format!("Dynamic rule for pattern '{pattern}'"));
    let severity = get(ENV_RULE_SEVERITY)
        .map(|value| Severity::parse_lenient(&value))
        .unwrap_or_default();
    Some(Rule::new(id, message, severity, vec![RulePattern::new(pattern)]))
}

/// The remote source URL: `rules_url` option, `url` option, then the
/// environment fallback.
fn remote_url(state: &PluginState, get: impl Fn(&str) -> Option<String>) -> Option<String> {
    state
        .option_str("rules_url")
        .or_else(|| state.option_str("url"))
        .map(str::to_owned)
        .or_else(|| get(ENV_RULES_URL))
        .filter(|url| !url.is_empty())
}

/// Fetches the remote payload. Any failure (connection, non-200 status,
/// body parse) is logged and degrades to `None`.
fn fetch_payload(url: &str) -> Option<Value> {
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|error| warn!(target: RULES_TARGET, %error, "http client construction failed"))
        .ok()?;
    let response = client
        .get(url)
        .send()
        .map_err(|error| warn!(target: RULES_TARGET, url = %url, %error, "rule fetch failed"))
        .ok()?;
    let status = response.status();
    if status.as_u16() != 200 {
        warn!(target: RULES_TARGET, url = %url, %status, "rule fetch returned non-200 status");
        return None;
    }
    response
        .json::<Value>()
        .map_err(|error| warn!(target: RULES_TARGET, url = %url, %error, "rule payload is not JSON"))
        .ok()
}

/// Persists fetched rules next to the static rule files so later sessions
/// can load them without the remote source.
fn persist_rules(dir: &Path, rules: &[Rule]) {
    let write = || -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        let text = serde_yaml::to_string(&RuleFileOut { rules })
            .map_err(std::io::Error::other)?;
        fs::write(dir.join(GENERATED_RULES_FILE), text)
    };
    match write() {
        Ok(()) => {
            debug!(target: RULES_TARGET, count = rules.len(), dir = %dir.display(), "persisted fetched rules");
        }
        Err(error) => {
            warn!(target: RULES_TARGET, %error, "failed to persist fetched rules");
        }
    }
}

// ---------------------------------------------------------------------------
// Remote payload shapes
// ---------------------------------------------------------------------------

/// The three accepted remote payload shapes, tried in this order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RulePayload {
    /// `{"rules": [{id, pattern|patterns, message?, severity?}, ..]}`
    Catalogue(Vec<Value>),
    /// `["PATTERN_A", "PATTERN_B", ..]`, one synthesized LOW rule each.
    Patterns(Vec<Value>),
    /// `{"banned_tokens": [..]}`, one synthesized MEDIUM rule each.
    BannedTokens(Vec<Value>),
}

impl RulePayload {
    /// Matches the payload against the accepted shapes; `None` means no
    /// shape matched and no rules are produced.
    pub(crate) fn decode(payload: &Value) -> Option<Self> {
        if let Some(rules) = payload.get("rules").and_then(Value::as_array) {
            return Some(Self::Catalogue(rules.clone()));
        }
        if let Some(items) = payload.as_array() {
            return Some(Self::Patterns(items.clone()));
        }
        if let Some(tokens) = payload.get("banned_tokens").and_then(Value::as_array) {
            return Some(Self::BannedTokens(tokens.clone()));
        }
        None
    }

    /// Converts the decoded shape into rule definitions. Entries that lack
    /// the fields their shape requires are skipped rather than failing the
    /// batch.
    pub(crate) fn into_rules(self) -> Vec<Rule> {
        match self {
            Self::Catalogue(entries) => {
                entries.iter().filter_map(catalogue_rule).collect()
            }
            Self::Patterns(items) => items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let text = stringify(item);
                    (!text.is_empty()).then(|| {
                        Rule::new(
                            format!("dynamic.list.{index}"),
                            format!("Match dynamic token '{text}'"),
                            Severity::Low,
                            vec![RulePattern::new(text)],
                        )
                    })
                })
                .collect(),
            Self::BannedTokens(tokens) => tokens
                .iter()
                .enumerate()
                .map(|(index, token)| {
                    let text = stringify(token);
                    Rule::new(
                        format!("dynamic.banned.{index}"),
                        format!("Banned token '{text}' detected"),
                        Severity::Medium,
                        vec![RulePattern::new(text)],
                    )
                })
                .collect(),
        }
    }
}

/// Decodes one catalogue entry; requires an `id` and at least one pattern.
fn catalogue_rule(entry: &Value) -> Option<Rule> {
    let object = entry.as_object()?;
    let id = object.get("id").and_then(Value::as_str)?;

    let patterns = catalogue_patterns(object.get("patterns").or_else(|| object.get("pattern"))?);
    if patterns.is_empty() {
        return None;
    }

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| format!("Dynamic rule {id}"), str::to_owned);
    let severity = object
        .get("severity")
        .map_or(Severity::Low, |value| Severity::parse_lenient(&stringify(value)));

    Some(Rule::new(id, message, severity, patterns))
}

fn catalogue_patterns(value: &Value) -> Vec<RulePattern> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => serde_json::from_value(item.clone()).ok(),
                Value::Null => None,
                scalar => Some(RulePattern::new(stringify(scalar))),
            })
            .collect(),
        Value::Null => Vec::new(),
        scalar => vec![RulePattern::new(stringify(scalar))],
    }
}

/// String form of a payload scalar: the string itself, or the JSON
/// rendering for anything else.
fn stringify(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_owned)
}
