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

use crate::mcp::protocol::*;
use crate::mcp::tools::{default_registry, RegistrationError, ToolRegistry};
use olapgate_gateway::PolicyGateway;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct McpHandler {
    gateway: Arc<PolicyGateway>,
    tools: ToolRegistry,
}

impl McpHandler {
    /// Handler exposing the full tool catalog.
    pub fn new(gateway: Arc<PolicyGateway>) -> Result<Self, RegistrationError> {
        let tools = default_registry(gateway.clone())?;
        Ok(Self { gateway, tools })
    }

    pub fn gateway(&self) -> &PolicyGateway {
        &self.gateway
    }

    /// Handle one JSON-RPC message. Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "MCP request received");

        let Some(id) = request.id else {
            self.handle_notification(&request.method);
            return None;
        };

        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, json!({})),
            "initialize" => self.handle_initialize(id),
            // Some clients send this as a request rather than a notification
            "initialized" | "notifications/initialized" => {
                self.handle_notification(&request.method);
                JsonRpcResponse::success(id, json!({}))
            }
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            _ => {
                warn!(method = %request.method, "Unknown MCP method");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method))
            }
        };
        Some(response)
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "initialized" | "notifications/initialized" => info!("MCP client initialized"),
            other => debug!(method = %other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&self, id: JsonRpcId) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        respond(id, &result)
    }

    fn handle_tools_list(&self, id: JsonRpcId) -> JsonRpcResponse {
        let result = ListToolsResult {
            tools: self.tools.list(),
            next_cursor: None,
        };
        respond(id, &result)
    }

    async fn handle_tools_call(&self, id: JsonRpcId, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)),
                )
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing tools/call params"),
                )
            }
        };

        let arguments = Value::Object(params.arguments.into_iter().collect());
        match self.tools.execute(&params.name, arguments).await {
            Ok(result) => respond(id, &result),
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool call failed");
                JsonRpcResponse::error(id, e.into())
            }
        }
    }
}

fn respond(id: JsonRpcId, result: &impl serde::Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}
