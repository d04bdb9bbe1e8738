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

//! Analytical query tools: run, analyze and export

use super::registry::{parse_params, McpTool, ToolError};
use super::tool_result;
use crate::mcp::protocol::CallToolResult;
use async_trait::async_trait;
use olapgate_core::{
    ExecutionResult, GatewayError, OperationKind, QueryMode, QueryRequest, Row,
};
use olapgate_gateway::PolicyGateway;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

/// Row cap for exports; effectively the whole result.
pub const EXPORT_ROW_LIMIT: usize = 1_000_000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunQueryParams {
    query: String,
    #[serde(default)]
    mode: QueryMode,
    #[serde(default)]
    max_rows: Option<usize>,
    #[serde(default)]
    runs: Option<u32>,
    #[serde(default)]
    bypass_cache: bool,
}

pub struct RunQueryTool {
    gateway: Arc<PolicyGateway>,
}

impl RunQueryTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for RunQueryTool {
    fn name(&self) -> &str {
        "run_query"
    }

    fn description(&self) -> &str {
        "Execute an analytical query. Mode 'preview' returns a truncated result, 'analyze' repeats the run and reports timing statistics, 'auto' picks one from the query shape."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Query text"},
                "mode": {"type": "string", "enum": ["auto", "preview", "analyze"], "default": "auto"},
                "max_rows": {"type": "integer", "minimum": 1},
                "runs": {"type": "integer", "minimum": 1},
                "bypass_cache": {"type": "boolean", "default": false}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: RunQueryParams = parse_params(self.name(), params)?;

        let mut builder = QueryRequest::builder(OperationKind::QueryExecution, params.query)
            .mode(params.mode)
            .bypass_cache(params.bypass_cache);
        if let Some(max_rows) = params.max_rows {
            builder = builder.max_rows(max_rows);
        }
        if let Some(runs) = params.runs {
            builder = builder.runs(runs);
        }

        tool_result(&self.gateway.execute(&builder.build()).await)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalyzeQueryParams {
    query: String,
    #[serde(default)]
    runs: Option<u32>,
}

pub struct AnalyzeQueryTool {
    gateway: Arc<PolicyGateway>,
}

impl AnalyzeQueryTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for AnalyzeQueryTool {
    fn name(&self) -> &str {
        "analyze_query"
    }

    fn description(&self) -> &str {
        "Run a query repeatedly and report min/avg/max timings with the storage-engine and formula-engine split."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "runs": {"type": "integer", "minimum": 1}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: AnalyzeQueryParams = parse_params(self.name(), params)?;

        let mut builder = QueryRequest::builder(OperationKind::QueryExecution, params.query)
            .mode(QueryMode::Analyze)
            // Timings from a cache hit would be meaningless
            .bypass_cache(true);
        if let Some(runs) = params.runs {
            builder = builder.runs(runs);
        }

        tool_result(&self.gateway.execute(&builder.build()).await)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExportQueryParams {
    query: String,
    path: String,
}

pub struct ExportQueryTool {
    gateway: Arc<PolicyGateway>,
}

impl ExportQueryTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }

    /// Write `rows` as JSON lines, returning the count written.
    async fn write_rows(path: &Path, rows: &[Row]) -> std::io::Result<usize> {
        let file = tokio::fs::File::create(path).await?;
        let mut writer = BufWriter::new(file);
        for row in rows {
            let mut line = serde_json::to_vec(row)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
        }
        writer.flush().await?;
        Ok(rows.len())
    }
}

#[async_trait]
impl McpTool for ExportQueryTool {
    fn name(&self) -> &str {
        "export_query"
    }

    fn description(&self) -> &str {
        "Execute a query and write every result row to an absolute file path as JSON lines."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "path": {"type": "string", "description": "Absolute destination path"}
            },
            "required": ["query", "path"]
        })
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: ExportQueryParams = parse_params(self.name(), params)?;

        let request = QueryRequest::builder(OperationKind::Export, params.query)
            .mode(QueryMode::Preview)
            .max_rows(EXPORT_ROW_LIMIT)
            .bypass_cache(true)
            .target_path(params.path.trim())
            .build();

        let result = self.gateway.execute(&request).await;
        let (Some(rows), Some(path)) = (result.rows.as_deref(), request.target_path()) else {
            return tool_result(&result);
        };

        let exported = match Self::write_rows(Path::new(path), rows).await {
            Ok(written) => {
                info!(rows = written, "Export written");
                let mut summary = Row::new();
                summary.insert("path".to_string(), json!(path));
                summary.insert("rows_written".to_string(), json!(written));
                ExecutionResult::success(vec![summary], result.trace)
            }
            Err(e) => self.gateway.failure(
                &GatewayError::Internal(format!("export write to {} failed: {}", path, e)),
                OperationKind::Export,
            ),
        };
        tool_result(&exported)
    }
}
