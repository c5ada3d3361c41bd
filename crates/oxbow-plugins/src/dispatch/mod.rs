//! Dispatch loop for one stdio session.
//!
//! Reads one line per call, decodes it, routes it to the lifecycle
//! controller or a declared capability handler, and writes back one
//! flushed response line. Malformed lines are dropped without a response;
//! requests without an id execute as notifications and are never
//! answered. The loop ends on end-of-stream, after `plugin.shutdown`, or
//! on a broken output pipe, all of which are ordinary session ends rather
//! than errors.

use std::io::{self, BufRead, ErrorKind, Write};

use serde_json::Value;
use tracing::{debug, trace};

use oxbow_proto::{LineWriter, LogLevel, RpcResponse, decode};

use crate::capability::{Capability, CapabilityHandler, CapabilityMethod, HostSink};
use crate::error::CallError;
use crate::lifecycle;
use crate::state::{Phase, PluginState};

/// Tracing target for session-level events.
const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Route target of one request, parsed once from the wire method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Init,
    Ping,
    Shutdown,
    Capability(CapabilityMethod),
}

impl Method {
    fn parse(name: &str) -> Option<Self> {
        match name {
            lifecycle::INIT_METHOD => Some(Self::Init),
            lifecycle::PING_METHOD => Some(Self::Ping),
            lifecycle::SHUTDOWN_METHOD => Some(Self::Shutdown),
            other => CapabilityMethod::parse(other).map(Self::Capability),
        }
    }
}

/// A plugin instance: its version string, capability handler set, and
/// process-wide state.
pub struct Plugin {
    version: String,
    handlers: Vec<Box<dyn CapabilityHandler>>,
    state: PluginState,
}

impl Plugin {
    /// Creates a plugin from its handler set. The declared capability set
    /// reported by `plugin.init` is derived from the handlers.
    #[must_use]
    pub fn new(version: impl Into<String>, handlers: Vec<Box<dyn CapabilityHandler>>) -> Self {
        let capabilities: Vec<Capability> = handlers
            .iter()
            .map(|handler| handler.capability())
            .collect();
        Self {
            version: version.into(),
            handlers,
            state: PluginState::new(capabilities),
        }
    }

    /// Returns the plugin state.
    #[must_use]
    pub const fn state(&self) -> &PluginState {
        &self.state
    }

    /// Routes one decoded request to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Terminated`] after `plugin.shutdown`,
    /// [`CallError::UnknownMethod`] for absent, unknown, or undeclared
    /// methods, and whatever protocol-level error the routed handler
    /// raises.
    pub fn dispatch(
        &mut self,
        method: Option<&str>,
        params: &Value,
        host: &mut dyn HostSink,
    ) -> Result<Value, CallError> {
        if self.state.phase() == Phase::Terminated {
            return Err(CallError::Terminated);
        }
        let Some(name) = method else {
            return Err(CallError::unknown_method(None));
        };
        let Some(method) = Method::parse(name) else {
            return Err(CallError::unknown_method(Some(name)));
        };

        match method {
            Method::Init => {
                lifecycle::init(&mut self.state, &self.handlers, host, &self.version, params)
            }
            Method::Ping => lifecycle::ping(),
            Method::Shutdown => lifecycle::shutdown(&mut self.state),
            Method::Capability(capability_method) => {
                let handler = self
                    .handlers
                    .iter()
                    .find(|handler| handler.methods().contains(&capability_method));
                match handler {
                    Some(handler) => {
                        trace!(target: DISPATCH_TARGET, method = name, "routing capability call");
                        handler.handle(capability_method, &mut self.state, host, params)
                    }
                    None => Err(CallError::unknown_method(Some(name))),
                }
            }
        }
    }
}

/// Host sink that writes `plugin.log` notifications through the session
/// writer, remembering the first write failure instead of panicking
/// inside a handler.
struct SessionSink<'a, W: Write> {
    writer: &'a mut LineWriter<W>,
    failure: Option<io::Error>,
}

impl<W: Write> HostSink for SessionSink<'_, W> {
    fn log(&mut self, level: LogLevel, message: &str) {
        if self.failure.is_some() {
            return;
        }
        if let Err(error) = self.writer.write_log(level, message) {
            self.failure = Some(error);
        }
    }
}

/// Runs the session to completion.
///
/// # Errors
///
/// Returns an I/O error only for output failures other than a broken
/// pipe; a broken pipe or input read failure ends the session silently,
/// matching the lifecycle of a parent that has gone away.
pub fn run<R: BufRead, W: Write>(plugin: &mut Plugin, input: R, output: W) -> io::Result<()> {
    let mut writer = LineWriter::new(output);

    for line in input.lines() {
        let Ok(line) = line else {
            debug!(target: DISPATCH_TARGET, "input stream failed; ending session");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        let request = match decode(&line) {
            Ok(request) => request,
            Err(error) => {
                trace!(target: DISPATCH_TARGET, %error, "dropping malformed line");
                continue;
            }
        };

        let (id, method, params) = request.into_parts();
        let (outcome, failure) = {
            let mut sink = SessionSink {
                writer: &mut writer,
                failure: None,
            };
            let outcome = plugin.dispatch(method.as_deref(), &params, &mut sink);
            (outcome, sink.failure)
        };
        if let Some(error) = failure {
            return silent_on_broken_pipe(error);
        }

        if let Some(id) = id {
            let response = match outcome {
                Ok(result) => RpcResponse::success(id, result),
                Err(call_error) => RpcResponse::failure(id, call_error.into_error_object()),
            };
            if let Err(error) = writer.write_response(&response) {
                return silent_on_broken_pipe(error);
            }
        }

        if plugin.state.phase() == Phase::Terminated {
            debug!(target: DISPATCH_TARGET, "session complete");
            break;
        }
    }

    Ok(())
}

fn silent_on_broken_pipe(error: io::Error) -> io::Result<()> {
    if error.kind() == ErrorKind::BrokenPipe {
        debug!(target: DISPATCH_TARGET, "output pipe closed; ending session");
        Ok(())
    } else {
        Err(error)
    }
}

#[cfg(test)]
mod tests;
