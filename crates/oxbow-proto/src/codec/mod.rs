//! Line codec for the stdio transport.
//!
//! Decoding turns one input line into an [`RpcRequest`]; a line that is not
//! a JSON object fails with [`DecodeError::Malformed`] and is dropped by
//! the dispatch loop rather than answered, because no correlation id can
//! be trusted to exist on a malformed line.
//!
//! Encoding goes through [`LineWriter`], which frames every outgoing
//! message as a single newline-terminated JSON document and flushes the
//! underlying stream after each line. The host reads responses with
//! blocking line semantics, so buffering across calls would deadlock the
//! conversation.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::envelope::{LogLevel, LogNotification, RpcRequest, RpcResponse};

/// Failure to decode an input line.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line is not syntactically valid JSON.
    #[error("malformed message: {source}")]
    Malformed {
        /// Underlying JSON parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The line parses as JSON but is not an object.
    #[error("malformed message: expected a JSON object")]
    NotAnObject,
}

/// Decodes a single input line into a request envelope.
///
/// The line must be a JSON object; other JSON documents (arrays, scalars)
/// are rejected outright rather than left to serde's struct coercions.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] when the line is not valid JSON and
/// [`DecodeError::NotAnObject`] when it is valid JSON of another shape.
/// Missing `id`, `method`, or `params` members are not decode failures;
/// they decode to the envelope's absent-field representations.
pub fn decode(line: &str) -> Result<RpcRequest, DecodeError> {
    let value: Value =
        serde_json::from_str(line).map_err(|source| DecodeError::Malformed { source })?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|source| DecodeError::Malformed { source })
}

/// Writer that frames protocol messages as flushed JSONL lines.
///
/// # Example
///
/// ```
/// use oxbow_proto::{LineWriter, RpcResponse};
///
/// let mut out = Vec::new();
/// let mut writer = LineWriter::new(&mut out);
/// let response = RpcResponse::success(serde_json::json!(1), serde_json::json!({}));
/// writer.write_response(&response).unwrap();
/// assert!(out.ends_with(b"\n"));
/// ```
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W: Write> LineWriter<W> {
    /// Creates a line writer wrapping the given output stream.
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes a response as one flushed line.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream; a broken pipe
    /// here means the parent has gone away and the caller should end the
    /// session silently.
    pub fn write_response(&mut self, response: &RpcResponse) -> io::Result<()> {
        self.write_line(response)
    }

    /// Writes a `plugin.log` notification as one flushed line.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying stream.
    pub fn write_log(&mut self, level: LogLevel, message: &str) -> io::Result<()> {
        self.write_line(&LogNotification::new(level, message))
    }

    /// Consumes the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, value).map_err(io::Error::from)?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()
    }
}
