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

use crate::mcp::handlers::McpHandler;
use crate::mcp::protocol::*;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use olapgate_gateway::GatewayDiagnostics;
use std::sync::Arc;

#[derive(Clone)]
pub struct McpServerState {
    pub handler: Arc<McpHandler>,
}

pub struct McpServer {
    state: McpServerState,
}

impl McpServer {
    pub fn new(handler: Arc<McpHandler>) -> Self {
        Self {
            state: McpServerState { handler },
        }
    }

    /// Get the Axum router for the MCP server
    pub fn router(&self) -> Router {
        Router::new()
            .route("/mcp", post(handle_mcp_request))
            .route("/mcp/health", get(handle_mcp_health))
            .route("/diagnostics", get(handle_diagnostics))
            .with_state(self.state.clone())
    }
}

async fn handle_mcp_health(State(state): State<McpServerState>) -> Json<serde_json::Value> {
    let connection = &state.handler.gateway().context().connection;
    Json(serde_json::json!({
        "status": "ok",
        "protocol_version": MCP_PROTOCOL_VERSION,
        "server_name": SERVER_NAME,
        "server_version": env!("CARGO_PKG_VERSION"),
        "engine_alive": connection.is_alive(),
        "capabilities": {
            "tools": true
        }
    }))
}

async fn handle_diagnostics(State(state): State<McpServerState>) -> Json<GatewayDiagnostics> {
    Json(state.handler.gateway().diagnostics())
}

async fn handle_mcp_request(
    State(state): State<McpServerState>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    match state.handler.handle_request(request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
