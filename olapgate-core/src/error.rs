// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types
//!
//! Two layers: [`EngineError`] and [`GatewayError`] carry full internal detail
//! and only ever reach logs; [`StructuredError`] is the caller-facing shape.

use crate::engine::ExecutionPath;
use crate::request::OperationKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Caller-visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotConnected,
    ValidationFailed,
    RateLimited,
    QueryTimeout,
    FallbackExhausted,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConnected => "NotConnected",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::QueryTimeout => "QueryTimeout",
            ErrorKind::FallbackExhausted => "FallbackExhausted",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing error. Never carries raw engine text or file paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
    pub suggestions: Vec<String>,
    /// Links this response to the log line holding the full detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Failures signalled by the engine itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The interface cannot express this request
    #[error("Operation unsupported by this interface: {0}")]
    Unsupported(String),

    /// The interface refused the request by policy
    #[error("Operation blocked by engine policy: {0}")]
    Blocked(String),

    /// The engine went away mid-call
    #[error("Engine disconnected: {0}")]
    Disconnected(String),

    /// The call observed its cancellation token
    #[error("Engine call cancelled")]
    Cancelled,

    /// Any other engine-side failure
    #[error("Engine fault: {0}")]
    Fault(String),
}

impl EngineError {
    /// Unsupported and blocked signatures route to the fallback path.
    pub fn is_fallback_signal(&self) -> bool {
        matches!(self, EngineError::Unsupported(_) | EngineError::Blocked(_))
    }
}

/// Internal pipeline failure, normalized before it reaches a caller.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Engine connection is not alive")]
    NotConnected,

    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Rate limit exceeded for {operation}, window resets in {retry_after:?}")]
    RateLimited {
        operation: OperationKind,
        retry_after: Duration,
    },

    #[error("{path} attempt for {operation} exceeded {timeout:?}")]
    Timeout {
        operation: OperationKind,
        path: ExecutionPath,
        timeout: Duration,
    },

    #[error("Both execution paths failed (primary: {primary}; fallback: {fallback})")]
    FallbackExhausted { primary: String, fallback: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NotConnected => ErrorKind::NotConnected,
            GatewayError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::Timeout { .. } => ErrorKind::QueryTimeout,
            GatewayError::FallbackExhausted { .. } => ErrorKind::FallbackExhausted,
            GatewayError::Engine(EngineError::Disconnected(_)) => ErrorKind::NotConnected,
            GatewayError::Engine(_) | GatewayError::Internal(_) => ErrorKind::InternalError,
        }
    }
}
