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

//! Query request types
//!
//! A [`QueryRequest`] is built once per call and never mutated afterwards.
//! Its [`OperationKind`] selects the rate-limit bucket and timeout that apply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Preview unless the query looks expensive
    #[default]
    Auto,
    /// Repeated timed runs
    Analyze,
    /// Truncated single run
    Preview,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Auto => "auto",
            QueryMode::Analyze => "analyze",
            QueryMode::Preview => "preview",
        }
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(QueryMode::Auto),
            "analyze" => Ok(QueryMode::Analyze),
            "preview" => Ok(QueryMode::Preview),
            other => Err(format!("unknown query mode: {}", other)),
        }
    }
}

/// Rate-limit and timeout classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    QueryExecution,
    MetadataFetch,
    Export,
    ConnectionAttempt,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::QueryExecution,
        OperationKind::MetadataFetch,
        OperationKind::Export,
        OperationKind::ConnectionAttempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::QueryExecution => "query_execution",
            OperationKind::MetadataFetch => "metadata_fetch",
            OperationKind::Export => "export",
            OperationKind::ConnectionAttempt => "connection_attempt",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown operation kind: {}", s))
    }
}

/// How the validator should interpret `text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    /// Analytical or DMV query text
    #[default]
    Query,
    /// Bare table/column name
    Identifier,
    /// Filesystem path
    Path,
}

/// An immutable query request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    text: String,
    #[serde(default)]
    text_kind: TextKind,
    #[serde(default)]
    mode: QueryMode,
    #[serde(default)]
    max_rows: Option<usize>,
    #[serde(default)]
    runs: Option<u32>,
    #[serde(default)]
    bypass_cache: bool,
    operation_kind: OperationKind,
    #[serde(default)]
    target_path: Option<String>,
}

impl QueryRequest {
    /// Start building a query request.
    pub fn builder(operation_kind: OperationKind, text: impl Into<String>) -> QueryRequestBuilder {
        QueryRequestBuilder {
            request: QueryRequest {
                text: text.into(),
                text_kind: TextKind::Query,
                mode: QueryMode::Auto,
                max_rows: None,
                runs: None,
                bypass_cache: false,
                operation_kind,
                target_path: None,
            },
        }
    }

    /// Shorthand for a query with default options.
    pub fn new(operation_kind: OperationKind, text: impl Into<String>) -> Self {
        Self::builder(operation_kind, text).build()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_kind(&self) -> TextKind {
        self.text_kind
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.max_rows
    }

    pub fn runs(&self) -> Option<u32> {
        self.runs
    }

    pub fn bypass_cache(&self) -> bool {
        self.bypass_cache
    }

    pub fn operation_kind(&self) -> OperationKind {
        self.operation_kind
    }

    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    /// A copy of this request carrying different text, e.g. the sanitized
    /// form produced by validation.
    pub fn with_text(&self, text: impl Into<String>) -> QueryRequest {
        QueryRequest {
            text: text.into(),
            ..self.clone()
        }
    }
}

/// Builder for [`QueryRequest`].
#[derive(Debug, Clone)]
pub struct QueryRequestBuilder {
    request: QueryRequest,
}

impl QueryRequestBuilder {
    pub fn text_kind(mut self, text_kind: TextKind) -> Self {
        self.request.text_kind = text_kind;
        self
    }

    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.request.mode = mode;
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.request.max_rows = Some(max_rows);
        self
    }

    pub fn runs(mut self, runs: u32) -> Self {
        self.request.runs = Some(runs);
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.request.bypass_cache = bypass;
        self
    }

    pub fn target_path(mut self, path: impl Into<String>) -> Self {
        self.request.target_path = Some(path.into());
        self
    }

    pub fn build(self) -> QueryRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = QueryRequest::new(OperationKind::QueryExecution, "EVALUATE Sales");
        assert_eq!(request.mode(), QueryMode::Auto);
        assert_eq!(request.text_kind(), TextKind::Query);
        assert!(!request.bypass_cache());
        assert!(request.max_rows().is_none());
    }

    #[test]
    fn test_operation_kind_wire_names() {
        let json = serde_json::to_string(&OperationKind::MetadataFetch).unwrap();
        assert_eq!(json, "\"metadata_fetch\"");
        assert_eq!(
            "connection_attempt".parse::<OperationKind>().unwrap(),
            OperationKind::ConnectionAttempt
        );
        assert!("bogus".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: QueryRequest = serde_json::from_value(serde_json::json!({
            "text": "EVALUATE Sales",
            "operation_kind": "query_execution",
            "mode": "preview"
        }))
        .unwrap();
        assert_eq!(request.mode(), QueryMode::Preview);
        assert_eq!(request.operation_kind(), OperationKind::QueryExecution);
        assert!(request.runs().is_none());
    }
}
