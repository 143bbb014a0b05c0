// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy surfaced to the application.

use serde::{Deserialize, Serialize};

/// Coarse classification carried on every connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailureReason {
    /// The transport factory refused to produce a connection.
    ConnectionFactory,
    /// The open handshake did not complete (refused, timed out, or torn down mid-open).
    OpenHandshake,
    /// The established stream failed (read error, idle timeout, write error).
    StreamFailure,
    Unknown,
}

/// A transient network or handshake failure.
///
/// Preserved verbatim in the `Failed` connection snapshot until the next connect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection failure ({reason:?}): {message}")]
pub struct ConnectionFailure {
    pub url: Option<String>,
    pub reason: ConnectionFailureReason,
    pub message: String,
    pub close_code: Option<u16>,
    pub close_reason: Option<String>,
    /// Underlying transport error rendered to a string, when one exists.
    pub cause: Option<String>,
}

impl ConnectionFailure {
    pub fn new(
        url: impl Into<Option<String>>,
        reason: ConnectionFailureReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            reason,
            message: message.into(),
            close_code: None,
            close_reason: None,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_close(mut self, code: Option<u16>, reason: Option<String>) -> Self {
        self.close_code = code;
        self.close_reason = reason;
        self
    }
}

/// Errors emitted on the output stream and recorded in `SessionState::last_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    ConnectionFailure(ConnectionFailure),
    /// Malformed or unexpected relay frame, canonical-id mismatch, unknown subscription.
    #[error("protocol violation: {description}")]
    ProtocolViolation { description: String },
    /// Encoding failure, transport not connected, or a rejected send.
    #[error("outbound failure in {context}: {reason}")]
    OutboundFailure { context: String, reason: String },
}

impl EngineError {
    pub fn protocol_violation(description: impl Into<String>) -> Self {
        Self::ProtocolViolation { description: description.into() }
    }

    pub fn outbound_failure(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutboundFailure { context: context.into(), reason: reason.into() }
    }
}
