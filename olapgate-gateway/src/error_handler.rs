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

//! Error normalization
//!
//! Every failure leaving the gateway goes through [`ErrorHandler::normalize`].
//! The full internal detail is logged under a correlation id; the caller gets
//! a templated message, suggestions, and the same id. Engine exception text
//! and file paths never reach the response.

use olapgate_core::{EngineError, ErrorKind, GatewayError, OperationKind, StructuredError};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, warn};

static UNIX_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[\s'(=])(/[\w.\-~]+){2,}/?").expect("static regex"));

static WINDOWS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:[A-Za-z]:|\\\\[\w.\-]+)\\[^\s'"]*"#).expect("static regex")
});

/// Replace filesystem paths in caller-visible text with `[path]`.
pub fn redact(text: &str) -> String {
    let text = WINDOWS_PATH.replace_all(text, "[path]");
    UNIX_PATH
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            // Keep the delimiter that preceded the path
            let whole = &caps[0];
            let lead: String = whole.chars().take_while(|c| *c != '/').collect();
            format!("{}[path]", lead)
        })
        .into_owned()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn new() -> Self {
        Self
    }

    /// Map `failure` to the caller-facing shape, logging its full detail.
    pub fn normalize(&self, failure: &GatewayError, operation: OperationKind) -> StructuredError {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let kind = failure.kind();

        match kind {
            ErrorKind::InternalError | ErrorKind::FallbackExhausted => error!(
                correlation_id = %correlation_id,
                operation = %operation,
                kind = %kind,
                detail = %failure,
                "Request failed"
            ),
            _ => warn!(
                correlation_id = %correlation_id,
                operation = %operation,
                kind = %kind,
                detail = %failure,
                "Request rejected"
            ),
        }

        StructuredError {
            kind,
            message: redact(&message_for(failure, operation)),
            suggestions: suggestions_for(failure),
            correlation_id: Some(correlation_id),
        }
    }
}

fn message_for(failure: &GatewayError, operation: OperationKind) -> String {
    match failure {
        GatewayError::NotConnected => "The analytical engine is not connected".to_string(),
        GatewayError::Engine(EngineError::Disconnected(_)) => {
            "The analytical engine disconnected during the request".to_string()
        }
        GatewayError::ValidationFailed { reason } => {
            format!("Request rejected by input validation: {}", reason)
        }
        GatewayError::RateLimited { .. } => {
            format!("Rate limit exceeded for {} operations", operation)
        }
        GatewayError::Timeout { timeout, .. } => format!(
            "The {} request did not complete within {} seconds",
            operation,
            timeout.as_secs()
        ),
        GatewayError::FallbackExhausted { .. } => {
            "The native query path refused the request and the object-model fallback also failed"
                .to_string()
        }
        GatewayError::Engine(_) => "The engine reported an error while executing the request".to_string(),
        GatewayError::Internal(_) => "An unexpected internal error occurred".to_string(),
    }
}

fn suggestions_for(failure: &GatewayError) -> Vec<String> {
    match failure.kind() {
        ErrorKind::NotConnected => vec![
            "Make sure the desktop application is running with a model open".to_string(),
            "Reconnect through the connection manager, then retry".to_string(),
        ],
        ErrorKind::ValidationFailed => vec![
            "Remove the rejected construct and resubmit".to_string(),
            "Only read-only queries, plain identifiers and absolute paths are accepted".to_string(),
        ],
        ErrorKind::RateLimited => {
            let mut out = Vec::new();
            if let GatewayError::RateLimited { retry_after, .. } = failure {
                out.push(format!(
                    "Retry after {} seconds",
                    retry_after.as_secs_f64().ceil() as u64
                ));
            }
            out.push("Reduce the call frequency or batch related requests".to_string());
            out
        }
        ErrorKind::QueryTimeout => vec![
            "Narrow the query or filter it to fewer rows".to_string(),
            "Use preview mode with a smaller max_rows".to_string(),
        ],
        ErrorKind::FallbackExhausted => vec![
            "Check that the objects named in the query exist in the model".to_string(),
            "Rephrase metadata requests as $SYSTEM.TMSCHEMA_* or INFO.*() queries".to_string(),
        ],
        ErrorKind::InternalError => vec![
            "Check the query syntax and the names it references".to_string(),
            "Search the gateway log for the correlation id for details".to_string(),
        ],
    }
}
