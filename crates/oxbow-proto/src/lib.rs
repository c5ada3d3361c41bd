//! Wire protocol for Oxbow plugin subprocesses.
//!
//! The Oxbow host launches each plugin as a child process and exchanges
//! line-delimited JSON-RPC over the plugin's standard input and output: one
//! UTF-8 JSON document per line, newline-terminated, flushed after every
//! line. This crate is the substrate the plugin runtime builds on. It
//! defines the envelope types ([`RpcRequest`], [`RpcResponse`],
//! [`LogNotification`]), the stable protocol error-code taxonomy
//! ([`ErrorCode`]), and the line codec ([`codec::decode`],
//! [`codec::LineWriter`]).
//!
//! The protocol is deliberately narrow: no streaming responses, no
//! multiplexing, no pipelining. One subprocess handles exactly one
//! line-synchronous conversation with its parent, matching request to
//! response by an opaque correlation id.

pub mod codec;
pub mod envelope;

pub use self::codec::{DecodeError, LineWriter, decode};
pub use self::envelope::{
    ErrorCode, LogLevel, LogNotification, RpcErrorObject, RpcRequest, RpcResponse,
};
