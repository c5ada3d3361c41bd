//! Plugin runtime for the Oxbow static-analysis host.
//!
//! An Oxbow plugin is a short-lived subprocess that holds exactly one
//! line-synchronous JSON-RPC conversation with its parent over stdio. The
//! runtime in this crate owns that conversation end to end: the
//! [`dispatch`] loop reads one line per call, decodes it through
//! `oxbow-proto`, routes it to the lifecycle controller or a declared
//! [`capability`] handler, and writes back one flushed response line.
//!
//! Process-wide state lives in an explicit [`state::PluginState`] value
//! created by `plugin.init` and passed by reference into every handler
//! call; there is no module-level mutability and no locking, because
//! execution is strictly one request at a time.
//!
//! Four built-in capability contracts ship with the runtime:
//!
//! - **discover**: workspace file enumeration plus manifest dependency
//!   scanning (`repo.discover`);
//! - **rules**: a rule table merged from local files, environment
//!   injection, and an optional remote source (`rules.list`, `rules.get`);
//! - **transform**: base64-block extraction from file payloads
//!   (`file.transform`);
//! - **report**: findings rendered into a PDF document (`scan.report`).
//!
//! Each has a matching reference binary under `src/bin/`.

pub mod capability;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod state;
pub mod telemetry;

pub use self::capability::{Capability, CapabilityHandler, CapabilityMethod, HostSink};
pub use self::dispatch::{Plugin, run};
pub use self::error::CallError;
pub use self::state::{PluginState, Rule, RuleTable, Severity};
