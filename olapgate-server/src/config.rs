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

use anyhow::Result;
use olapgate_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Olapgate Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP listen address (e.g., "127.0.0.1:47200")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// JSON fixture backing the engine; the built-in sample model when unset
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,
}

fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}

fn default_enable_cors() -> bool {
    true
}

const ENV_HTTP_ADDR: &str = "OLAPGATE_HTTP_ADDR";
const ENV_FIXTURE: &str = "OLAPGATE_FIXTURE";
const ENV_LOG_JSON: &str = "OLAPGATE_LOG_JSON";
const ENV_CACHE_TTL_SECS: &str = "OLAPGATE_CACHE_TTL_SECS";
const ENV_CACHE_MAX_ENTRIES: &str = "OLAPGATE_CACHE_MAX_ENTRIES";

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - OLAPGATE_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47200)
    /// - OLAPGATE_FIXTURE: Engine fixture file (default: built-in sample model)
    /// - OLAPGATE_LOG_JSON: JSON log output (default: false)
    /// - OLAPGATE_CACHE_TTL_SECS: Result cache TTL in seconds (default: 300)
    /// - OLAPGATE_CACHE_MAX_ENTRIES: Result cache capacity (default: 512)
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(path = ?path, "Loading configuration from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!(path = ?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        Ok(config.merge_with_env())
    }

    /// Override fields whose environment variable is set
    fn merge_with_env(mut self) -> Self {
        if let Ok(addr) = std::env::var(ENV_HTTP_ADDR) {
            self.server.listen_addr = addr;
        }
        if let Ok(fixture) = std::env::var(ENV_FIXTURE) {
            self.engine.fixture = Some(PathBuf::from(fixture));
        }
        if let Ok(json) = std::env::var(ENV_LOG_JSON) {
            self.logging.json = json.parse().unwrap_or(false);
        }
        if let Ok(ttl) = std::env::var(ENV_CACHE_TTL_SECS) {
            match ttl.parse() {
                Ok(val) => self.gateway.cache.ttl_secs = val,
                Err(_) => tracing::warn!(value = %ttl, "Ignoring unparsable {}", ENV_CACHE_TTL_SECS),
            }
        }
        if let Ok(entries) = std::env::var(ENV_CACHE_MAX_ENTRIES) {
            match entries.parse() {
                Ok(val) => self.gateway.cache.max_entries = val,
                Err(_) => {
                    tracing::warn!(value = %entries, "Ignoring unparsable {}", ENV_CACHE_MAX_ENTRIES)
                }
            }
        }
        self
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        self.gateway.validate()?;

        if let Some(fixture) = &self.engine.fixture {
            if !fixture.is_file() {
                anyhow::bail!("Engine fixture not found: {:?}", fixture);
            }
        }

        Ok(())
    }
}
