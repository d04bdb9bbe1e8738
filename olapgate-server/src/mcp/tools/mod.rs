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

//! Tool catalog
//!
//! Every tool maps onto exactly one gateway operation; none of them talks to
//! the engine directly.

pub mod metadata;
pub mod query;
pub mod registry;
pub mod status;

pub use registry::{McpTool, RegistrationError, ToolError, ToolRegistry};

use crate::mcp::protocol::CallToolResult;
use olapgate_core::ExecutionResult;
use olapgate_gateway::PolicyGateway;
use std::sync::Arc;

/// Wrap a gateway result; `isError` mirrors `!success`.
pub(crate) fn tool_result(result: &ExecutionResult) -> Result<CallToolResult, ToolError> {
    CallToolResult::json(result, !result.success).map_err(|e| ToolError::Execution(e.to_string()))
}

/// Registry holding the full tool catalog over `gateway`.
pub fn default_registry(gateway: Arc<PolicyGateway>) -> Result<ToolRegistry, RegistrationError> {
    let registry = ToolRegistry::new();
    let tools: Vec<Arc<dyn McpTool>> = vec![
        Arc::new(query::RunQueryTool::new(gateway.clone())),
        Arc::new(query::AnalyzeQueryTool::new(gateway.clone())),
        Arc::new(query::ExportQueryTool::new(gateway.clone())),
        Arc::new(metadata::RunDmvTool::new(gateway.clone())),
        Arc::new(metadata::ListTablesTool::new(gateway.clone())),
        Arc::new(metadata::ListColumnsTool::new(gateway.clone())),
        Arc::new(metadata::ListMeasuresTool::new(gateway.clone())),
        Arc::new(status::ConnectionStatusTool::new(gateway.clone())),
        Arc::new(status::GatewayDiagnosticsTool::new(gateway)),
    ];
    for tool in tools {
        registry.register(tool)?;
    }
    Ok(registry)
}
