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

//! Model introspection tools

use super::registry::{parse_params, McpTool, ToolError};
use super::tool_result;
use crate::mcp::protocol::CallToolResult;
use async_trait::async_trait;
use olapgate_core::{OperationKind, QueryMode, QueryRequest, TextKind};
use olapgate_gateway::PolicyGateway;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const TABLES_DMV: &str = "SELECT * FROM $SYSTEM.TMSCHEMA_TABLES";
const MEASURES_DMV: &str = "SELECT * FROM $SYSTEM.TMSCHEMA_MEASURES";

fn metadata_request(text: impl Into<String>, max_rows: Option<usize>) -> QueryRequest {
    let mut builder =
        QueryRequest::builder(OperationKind::MetadataFetch, text).mode(QueryMode::Preview);
    if let Some(max_rows) = max_rows {
        builder = builder.max_rows(max_rows);
    }
    builder.build()
}

fn columns_dmv(table: &str) -> String {
    format!(
        "SELECT * FROM $SYSTEM.TMSCHEMA_COLUMNS WHERE [TableName] = '{}'",
        table.replace('\'', "''")
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PagingParams {
    #[serde(default)]
    max_rows: Option<usize>,
}

fn paging_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "max_rows": {"type": "integer", "minimum": 1}
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunDmvParams {
    query: String,
    #[serde(default)]
    max_rows: Option<usize>,
}

pub struct RunDmvTool {
    gateway: Arc<PolicyGateway>,
}

impl RunDmvTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for RunDmvTool {
    fn name(&self) -> &str {
        "run_dmv"
    }

    fn description(&self) -> &str {
        "Run a $SYSTEM dynamic management view or INFO function query. Falls back to the object model when the engine blocks DMVs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "e.g. SELECT * FROM $SYSTEM.TMSCHEMA_TABLES"},
                "max_rows": {"type": "integer", "minimum": 1}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: RunDmvParams = parse_params(self.name(), params)?;
        let request = metadata_request(params.query, params.max_rows);
        tool_result(&self.gateway.execute(&request).await)
    }
}

pub struct ListTablesTool {
    gateway: Arc<PolicyGateway>,
}

impl ListTablesTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for ListTablesTool {
    fn name(&self) -> &str {
        "list_tables"
    }

    fn description(&self) -> &str {
        "List the tables of the open model."
    }

    fn input_schema(&self) -> Value {
        paging_schema()
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: PagingParams = parse_params(self.name(), params)?;
        let request = metadata_request(TABLES_DMV, params.max_rows);
        tool_result(&self.gateway.execute(&request).await)
    }
}

pub struct ListMeasuresTool {
    gateway: Arc<PolicyGateway>,
}

impl ListMeasuresTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for ListMeasuresTool {
    fn name(&self) -> &str {
        "list_measures"
    }

    fn description(&self) -> &str {
        "List the measures of the open model with their expressions."
    }

    fn input_schema(&self) -> Value {
        paging_schema()
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: PagingParams = parse_params(self.name(), params)?;
        let request = metadata_request(MEASURES_DMV, params.max_rows);
        tool_result(&self.gateway.execute(&request).await)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListColumnsParams {
    table: String,
    #[serde(default)]
    max_rows: Option<usize>,
}

pub struct ListColumnsTool {
    gateway: Arc<PolicyGateway>,
}

impl ListColumnsTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for ListColumnsTool {
    fn name(&self) -> &str {
        "list_columns"
    }

    fn description(&self) -> &str {
        "List the columns of one table."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": {"type": "string", "description": "Table name"},
                "max_rows": {"type": "integer", "minimum": 1}
            },
            "required": ["table"]
        })
    }

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
        let params: ListColumnsParams = parse_params(self.name(), params)?;

        // The table name is spliced into query text, so it must pass the
        // identifier rules before the query is built.
        let identifier = QueryRequest::builder(OperationKind::MetadataFetch, params.table)
            .text_kind(TextKind::Identifier)
            .build();
        let table = match self.gateway.check_input(&identifier) {
            Ok(table) => table,
            Err(rejected) => return tool_result(&rejected),
        };

        let request = metadata_request(columns_dmv(&table), params.max_rows);
        tool_result(&self.gateway.execute(&request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_dmv_quotes_table() {
        assert_eq!(
            columns_dmv("Sales"),
            "SELECT * FROM $SYSTEM.TMSCHEMA_COLUMNS WHERE [TableName] = 'Sales'"
        );
        assert!(columns_dmv("O'Brien").ends_with("'O''Brien'"));
    }
}
