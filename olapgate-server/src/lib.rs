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

//! Olapgate Server
//!
//! Exposes the policy gateway as an MCP tool server over HTTP or stdio.

pub mod config;
pub mod fixture;
pub mod mcp;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::Router;
use config::ServerConfig;
use fixture::FixtureEngine;
use mcp::{LineTransport, McpHandler, McpServer};
use olapgate_gateway::{GatewayContext, PolicyGateway};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "olapgate_server=info,olapgate_gateway=info,tower_http=info";

/// Install the global subscriber. Logs always go to stderr so stdout stays
/// free for protocol frames. A second call is a no-op.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Gateway over the configured fixture engine.
pub fn build_gateway(config: &ServerConfig) -> Result<Arc<PolicyGateway>> {
    let engine = match &config.engine.fixture {
        Some(path) => {
            tracing::info!(path = ?path, "Loading engine fixture");
            FixtureEngine::load(path)?
        }
        None => {
            tracing::info!("No fixture configured, serving the bundled sample model");
            FixtureEngine::sample()?
        }
    };

    let context = GatewayContext::new(config.gateway.clone(), Arc::new(engine));
    Ok(Arc::new(PolicyGateway::new(context)?))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.server.cors_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    tracing::info!("CORS: Allowing origins: {:?}", config.server.cors_origins);
    cors.allow_origin(AllowOrigin::list(origins))
}

/// HTTP application: MCP routes plus the configured middleware.
pub fn build_router(handler: Arc<McpHandler>, config: &ServerConfig) -> Router {
    let app = McpServer::new(handler).router();
    let app = if config.server.enable_cors {
        app.layer(cors_layer(config))
    } else {
        app
    };
    app.layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    init_logging(config.logging.json);

    tracing::info!("Starting Olapgate Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;

    let gateway = build_gateway(&config)?;
    let handler = Arc::new(McpHandler::new(gateway)?);
    let app = build_router(handler, &config);

    let addr = config.socket_addr()?;
    tracing::info!("MCP Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Serve MCP over stdin/stdout until stdin closes.
pub async fn run_stdio(config: ServerConfig) -> Result<()> {
    init_logging(config.logging.json);

    tracing::info!("Starting Olapgate stdio server");
    config.validate()?;

    let gateway = build_gateway(&config)?;
    let handler = McpHandler::new(gateway)?;

    LineTransport::stdio().serve(&handler).await?;
    Ok(())
}
