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

//! Newline-delimited JSON-RPC over a byte stream (stdio in production)

use crate::mcp::handlers::McpHandler;
use crate::mcp::protocol::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Next non-blank line, or `None` at end of input.
    async fn recv_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
    }

    async fn send(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        let mut payload = serde_json::to_vec(response)?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Serve requests until the input closes.
    pub async fn serve(&mut self, handler: &McpHandler) -> Result<(), TransportError> {
        while let Some(line) = self.recv_line().await? {
            let response = match serde_json::from_str::<JsonRpcRequest>(line.trim()) {
                Ok(request) => handler.handle_request(request).await,
                Err(e) => {
                    warn!(error = %e, "Invalid JSON-RPC message");
                    Some(JsonRpcResponse::error(
                        JsonRpcId::Null,
                        JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
                    ))
                }
            };
            if let Some(response) = response {
                self.send(&response).await?;
            }
        }
        info!("Input closed, stopping stdio transport");
        Ok(())
    }
}

impl LineTransport<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}
