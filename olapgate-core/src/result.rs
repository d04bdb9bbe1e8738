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

use crate::error::StructuredError;
use crate::trace::ExecutionTrace;
use serde::{Deserialize, Serialize};

/// A single result record, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of input validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_text: Option<String>,
}

impl ValidationResult {
    pub fn accepted(sanitized_text: impl Into<String>) -> Self {
        Self {
            ok: true,
            reason: None,
            sanitized_text: Some(sanitized_text.into()),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            sanitized_text: None,
        }
    }
}

/// The structured response every gateway operation returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
    /// Served from the result cache
    #[serde(default)]
    pub cached: bool,
}

impl ExecutionResult {
    pub fn success(rows: Vec<Row>, trace: Option<ExecutionTrace>) -> Self {
        let row_count = rows.len();
        Self {
            success: true,
            rows: Some(rows),
            row_count: Some(row_count),
            trace,
            error: None,
            cached: false,
        }
    }

    pub fn failure(error: StructuredError) -> Self {
        Self {
            success: false,
            rows: None,
            row_count: None,
            trace: None,
            error: Some(error),
            cached: false,
        }
    }

    /// Copy of this result as served from cache: no trace, `cached` set.
    pub fn as_cached(&self) -> Self {
        Self {
            trace: None,
            cached: true,
            ..self.clone()
        }
    }
}
