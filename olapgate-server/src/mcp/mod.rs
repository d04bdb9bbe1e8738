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

//! Model Context Protocol (MCP) surface
//!
//! JSON-RPC 2.0 over two transports:
//!
//! - HTTP: `POST /mcp`, plus `GET /mcp/health` and `GET /diagnostics`
//! - stdio: one JSON message per line; logs go to stderr
//!
//! Methods: `initialize`, `initialized`, `ping`, `tools/list`, `tools/call`.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use handlers::McpHandler;
pub use server::{McpServer, McpServerState};
pub use transport::{LineTransport, TransportError};
