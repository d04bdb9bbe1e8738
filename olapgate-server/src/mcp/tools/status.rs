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

use super::registry::{McpTool, ToolError};
use super::tool_result;
use crate::mcp::protocol::CallToolResult;
use async_trait::async_trait;
use olapgate_gateway::PolicyGateway;
use serde_json::{json, Value};
use std::sync::Arc;

fn no_params() -> Value {
    json!({"type": "object", "properties": {}})
}

pub struct ConnectionStatusTool {
    gateway: Arc<PolicyGateway>,
}

impl ConnectionStatusTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for ConnectionStatusTool {
    fn name(&self) -> &str {
        "connection_status"
    }

    fn description(&self) -> &str {
        "Check whether the analytical engine is connected and which execution paths it offers."
    }

    fn input_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _params: Value) -> Result<CallToolResult, ToolError> {
        tool_result(&self.gateway.check_connection().await)
    }
}

pub struct GatewayDiagnosticsTool {
    gateway: Arc<PolicyGateway>,
}

impl GatewayDiagnosticsTool {
    pub fn new(gateway: Arc<PolicyGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl McpTool for GatewayDiagnosticsTool {
    fn name(&self) -> &str {
        "gateway_diagnostics"
    }

    fn description(&self) -> &str {
        "Per-operation call counts, error counts and latency percentiles, with cache and rate-limit state."
    }

    fn input_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _params: Value) -> Result<CallToolResult, ToolError> {
        CallToolResult::json(&self.gateway.diagnostics(), false)
            .map_err(|e| ToolError::Execution(e.to_string()))
    }
}
