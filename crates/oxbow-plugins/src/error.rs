//! Protocol-level call errors.
//!
//! A [`CallError`] becomes the `error` member of a response line; it never
//! crashes the process or stops the read loop. Handler-level business
//! failures (an unreadable file, a malformed base64 block, a rendering
//! failure) are deliberately *not* represented here: handlers fold those
//! into normal `result` payloads so that one bad input cannot poison a
//! batch request.

use serde_json::json;
use thiserror::Error;

use oxbow_proto::{ErrorCode, RpcErrorObject};

/// Errors returned to the host as protocol-level `error` objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The method name is unknown, undeclared, or missing.
    #[error("unknown method")]
    UnknownMethod {
        /// The offending method name, when one was supplied.
        method: Option<String>,
    },

    /// The params payload does not match the method contract.
    #[error("invalid parameters: {message}")]
    InvalidParams {
        /// Description of the mismatch.
        message: String,
    },

    /// `rules.get` referenced an id absent from the rule table.
    #[error("rule '{id}' not found")]
    RuleNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A method arrived after `plugin.shutdown` completed.
    #[error("plugin has shut down")]
    Terminated,
}

impl CallError {
    /// Creates an unknown-method error.
    #[must_use]
    pub fn unknown_method(method: Option<&str>) -> Self {
        Self::UnknownMethod {
            method: method.map(str::to_owned),
        }
    }

    /// Creates an invalid-parameters error from any displayable cause.
    #[must_use]
    pub fn invalid_params(cause: impl std::fmt::Display) -> Self {
        Self::InvalidParams {
            message: cause.to_string(),
        }
    }

    /// Returns the stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownMethod { .. } => ErrorCode::MethodNotFound,
            Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::RuleNotFound { .. } => ErrorCode::RuleNotFound,
            Self::Terminated => ErrorCode::Terminated,
        }
    }

    /// Converts the error into its wire representation.
    #[must_use]
    pub fn into_error_object(self) -> RpcErrorObject {
        let code = self.code();
        let message = self.to_string();
        let object = RpcErrorObject::new(code, message);
        match self {
            Self::UnknownMethod {
                method: Some(method),
            } => object.with_data(json!({ "method": method })),
            _ => object,
        }
    }
}
