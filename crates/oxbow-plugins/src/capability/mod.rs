//! Capability contract system for Oxbow plugins.
//!
//! A capability is a named method group a plugin may implement. Each
//! contract is stateless per call: a handler consumes a decoded request
//! and produces a decoded response, as a function of its inputs plus the
//! plugin-local [`PluginState`]. The dispatch loop routes capability
//! methods only to handlers the plugin was constructed with; undeclared
//! methods are rejected uniformly with the unknown-method error.

pub mod discover;
pub mod report;
pub mod rules;
pub mod transform;


use std::time::Instant;

use serde_json::Value;

use oxbow_proto::LogLevel;

use crate::error::CallError;
use crate::state::PluginState;

pub use self::discover::DiscoverCapability;
pub use self::report::ReportCapability;
pub use self::rules::RulesCapability;
pub use self::transform::TransformCapability;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Identifies a capability a plugin can declare in its `plugin.init`
/// result.
///
/// # Example
///
/// ```
/// use oxbow_plugins::Capability;
///
/// assert_eq!(Capability::Discover.as_str(), "discover");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Workspace file enumeration and manifest scanning.
    Discover,
    /// Rule table queries.
    Rules,
    /// File content transformation.
    Transform,
    /// Findings-to-document rendering.
    Report,
}

impl Capability {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Rules => "rules",
            Self::Transform => "transform",
            Self::Report => "report",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CapabilityMethod
// ---------------------------------------------------------------------------

/// The capability method names of the protocol, parsed once per request
/// into a static variant instead of being re-matched as strings downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityMethod {
    /// `repo.discover`
    RepoDiscover,
    /// `rules.list`
    RulesList,
    /// `rules.get`
    RulesGet,
    /// `file.transform`
    FileTransform,
    /// `scan.report`
    ScanReport,
}

impl CapabilityMethod {
    /// Parses a wire method name.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "repo.discover" => Some(Self::RepoDiscover),
            "rules.list" => Some(Self::RulesList),
            "rules.get" => Some(Self::RulesGet),
            "file.transform" => Some(Self::FileTransform),
            "scan.report" => Some(Self::ScanReport),
            _ => None,
        }
    }

    /// Returns the wire method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RepoDiscover => "repo.discover",
            Self::RulesList => "rules.list",
            Self::RulesGet => "rules.get",
            Self::FileTransform => "file.transform",
            Self::ScanReport => "scan.report",
        }
    }
}

impl std::fmt::Display for CapabilityMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HostSink
// ---------------------------------------------------------------------------

/// Outbound notification channel from a handler to the host.
///
/// The production implementation writes `plugin.log` lines through the
/// session's response writer; tests substitute a recording or mock sink.
#[cfg_attr(test, mockall::automock)]
pub trait HostSink {
    /// Emits a host-directed log notification.
    fn log(&mut self, level: LogLevel, message: &str);
}

/// Sink that discards notifications; useful for initialisation paths that
/// run before a session writer exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl HostSink for NullSink {
    fn log(&mut self, _level: LogLevel, _message: &str) {}
}

// ---------------------------------------------------------------------------
// CapabilityHandler
// ---------------------------------------------------------------------------

/// Outcome of a capability call: a result payload, or a protocol-level
/// error. Business failures never surface here; handlers fold them into
/// the payload.
pub type CallResult = Result<Value, CallError>;

/// Contract implemented by each capability.
pub trait CapabilityHandler {
    /// Returns the capability this handler implements.
    fn capability(&self) -> Capability;

    /// Returns the method set this handler serves.
    fn methods(&self) -> &'static [CapabilityMethod];

    /// Runs capability-specific side effects during `plugin.init`,
    /// synchronously, before the init response is written. The rules
    /// capability populates its table here; most capabilities need
    /// nothing.
    fn initialise(&self, state: &mut PluginState, host: &mut dyn HostSink) {
        let _ = (state, host);
    }

    /// Handles one capability method call.
    ///
    /// # Errors
    ///
    /// Returns a [`CallError`] only for protocol-level failures (invalid
    /// parameters, unknown rule id). Per-input business failures must be
    /// folded into the result payload instead.
    fn handle(
        &self,
        method: CapabilityMethod,
        state: &mut PluginState,
        host: &mut dyn HostSink,
        params: &Value,
    ) -> CallResult;
}

/// Milliseconds elapsed since `start`, saturating on overflow.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
