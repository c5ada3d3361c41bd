//! Stderr telemetry bootstrap for plugin binaries.
//!
//! Stdout belongs to the protocol, so all diagnostics go to stderr. The
//! filter comes from `OXBOW_LOG` with an `info` fallback. Initialisation
//! is infallible: a plugin must come up and speak the protocol even when
//! its logging configuration is broken.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Environment variable holding the log filter expression.
pub const LOG_FILTER_ENV: &str = "OXBOW_LOG";

const DEFAULT_FILTER: &str = "info";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Configures the global tracing subscriber when invoked for the first
/// time.
///
/// Repeated calls are idempotent: the first invocation installs the
/// global subscriber and later ones return a fresh handle without
/// touching global state again.
pub fn initialise() -> TelemetryHandle {
    TELEMETRY_GUARD.get_or_init(install_subscriber);
    TelemetryHandle
}

fn install_subscriber() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .finish();

    // A pre-existing global subscriber (another library, a test harness)
    // wins; the plugin keeps running either way.
    drop(tracing::subscriber::set_global_default(subscriber));
}
