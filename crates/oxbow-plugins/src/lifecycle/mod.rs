//! Mandatory lifecycle methods: `plugin.init`, `plugin.ping`,
//! `plugin.shutdown`.
//!
//! `plugin.init` is re-entrant: a later call replaces the workspace root
//! when one is supplied and merges options key-by-key; capability
//! handlers re-run their initialisation side effects against the merged
//! state. `plugin.shutdown` is terminal.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::capability::{CallResult, CapabilityHandler, HostSink};
use crate::error::CallError;
use crate::state::PluginState;

/// Tracing target for lifecycle transitions.
const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Wire names of the mandatory methods.
pub const INIT_METHOD: &str = "plugin.init";
/// `plugin.ping` wire name.
pub const PING_METHOD: &str = "plugin.ping";
/// `plugin.shutdown` wire name.
pub const SHUTDOWN_METHOD: &str = "plugin.shutdown";

/// Parameters of a `plugin.init` call.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InitParams {
    workspace_root: Option<PathBuf>,
    options: Option<Map<String, Value>>,
}

/// Applies a `plugin.init` call: merges the supplied configuration into
/// the state, runs each handler's initialisation side effects, and
/// reports the declared capability set.
///
/// # Errors
///
/// Returns [`CallError::InvalidParams`] when the params payload does not
/// match the init contract.
pub fn init(
    state: &mut PluginState,
    handlers: &[Box<dyn CapabilityHandler>],
    host: &mut dyn HostSink,
    version: &str,
    params: &Value,
) -> CallResult {
    let params: InitParams = if params.is_null() {
        InitParams::default()
    } else {
        serde_json::from_value(params.clone()).map_err(CallError::invalid_params)?
    };

    state.initialise(params.workspace_root, params.options.unwrap_or_default());
    for handler in handlers {
        handler.initialise(state, host);
    }

    info!(
        target: LIFECYCLE_TARGET,
        workspace_root = %state.workspace_root().display(),
        rules = state.rules().len(),
        "plugin initialised"
    );

    Ok(json!({
        "ok": true,
        "capabilities": state.capabilities(),
        "plugin_version": version,
    }))
}

/// Answers a `plugin.ping` call.
///
/// # Errors
///
/// Never fails; typed as [`CallResult`] for routing uniformity.
pub fn ping() -> CallResult {
    Ok(json!({ "pong": true }))
}

/// Applies a `plugin.shutdown` call and marks the state terminated.
///
/// # Errors
///
/// Never fails; typed as [`CallResult`] for routing uniformity.
pub fn shutdown(state: &mut PluginState) -> CallResult {
    state.terminate();
    info!(target: LIFECYCLE_TARGET, "plugin shut down");
    Ok(json!({ "ok": true }))
}
