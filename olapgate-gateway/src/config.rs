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

//! Gateway policy configuration
//!
//! Deserialized from the `[gateway]` section of the server's TOML file. Every
//! field has a default so an empty section yields the stock policy.

use crate::validation::default_denylist;
use olapgate_core::OperationKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Time-to-live of a cached result in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of cached results
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    512
}

/// Window bookkeeping used by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStrategy {
    /// Log of admission instants; at most `limit` in any window-length span
    #[default]
    Sliding,
    /// Counter reset when the window elapses
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default)]
    pub strategy: WindowStrategy,

    #[serde(default)]
    pub per_minute: OperationLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            strategy: WindowStrategy::default(),
            per_minute: OperationLimits::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_window_secs() -> u64 {
    60
}

/// Admission ceiling per operation kind.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OperationLimits {
    #[serde(default = "default_query_limit")]
    pub query_execution: u32,
    #[serde(default = "default_metadata_limit")]
    pub metadata_fetch: u32,
    #[serde(default = "default_export_limit")]
    pub export: u32,
    #[serde(default = "default_connection_limit")]
    pub connection_attempt: u32,
}

impl Default for OperationLimits {
    fn default() -> Self {
        Self {
            query_execution: default_query_limit(),
            metadata_fetch: default_metadata_limit(),
            export: default_export_limit(),
            connection_attempt: default_connection_limit(),
        }
    }
}

impl OperationLimits {
    pub fn get(&self, kind: OperationKind) -> u32 {
        match kind {
            OperationKind::QueryExecution => self.query_execution,
            OperationKind::MetadataFetch => self.metadata_fetch,
            OperationKind::Export => self.export,
            OperationKind::ConnectionAttempt => self.connection_attempt,
        }
    }
}

fn default_query_limit() -> u32 {
    30
}

fn default_metadata_limit() -> u32 {
    60
}

fn default_export_limit() -> u32 {
    10
}

fn default_connection_limit() -> u32 {
    20
}

/// Attempt timeout per operation kind, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_query_timeout")]
    pub query_execution: u64,
    #[serde(default = "default_metadata_timeout")]
    pub metadata_fetch: u64,
    #[serde(default = "default_export_timeout")]
    pub export: u64,
    #[serde(default = "default_connection_timeout")]
    pub connection_attempt: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_execution: default_query_timeout(),
            metadata_fetch: default_metadata_timeout(),
            export: default_export_timeout(),
            connection_attempt: default_connection_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn get(&self, kind: OperationKind) -> Duration {
        let secs = match kind {
            OperationKind::QueryExecution => self.query_execution,
            OperationKind::MetadataFetch => self.metadata_fetch,
            OperationKind::Export => self.export,
            OperationKind::ConnectionAttempt => self.connection_attempt,
        };
        Duration::from_secs(secs)
    }
}

fn default_query_timeout() -> u64 {
    60
}

fn default_metadata_timeout() -> u64 {
    30
}

fn default_export_timeout() -> u64 {
    300
}

fn default_connection_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Repetitions for analyze mode when the request leaves `runs` unset
    #[serde(default = "default_analyze_runs")]
    pub default_analyze_runs: u32,

    #[serde(default = "default_max_analyze_runs")]
    pub max_analyze_runs: u32,

    /// Row cap for preview mode when the request leaves `max_rows` unset
    #[serde(default = "default_preview_rows")]
    pub default_preview_rows: usize,

    /// Kinds for which a generic engine fault also routes to the fallback path
    #[serde(default)]
    pub fallback_on_fault: Vec<OperationKind>,

    /// Regexes marking a query as expensive in auto mode (empty = never)
    #[serde(default)]
    pub expensive_patterns: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_analyze_runs: default_analyze_runs(),
            max_analyze_runs: default_max_analyze_runs(),
            default_preview_rows: default_preview_rows(),
            fallback_on_fault: Vec::new(),
            expensive_patterns: Vec::new(),
        }
    }
}

fn default_analyze_runs() -> u32 {
    3
}

fn default_max_analyze_runs() -> u32 {
    20
}

fn default_preview_rows() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_query_bytes")]
    pub max_query_bytes: usize,

    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,

    /// Case-insensitive regexes matched against comment-stripped query text
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_query_bytes: default_max_query_bytes(),
            max_identifier_length: default_max_identifier_length(),
            denylist: default_denylist(),
        }
    }
}

fn default_max_query_bytes() -> usize {
    1024 * 1024
}

fn default_max_identifier_length() -> usize {
    128
}

impl GatewayConfig {
    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        if self.rate_limits.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limits.window_secs must be at least 1".to_string(),
            ));
        }
        for kind in OperationKind::ALL {
            if self.timeouts.get(kind).is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "timeouts.{} must be at least 1 second",
                    kind
                )));
            }
        }

        let execution = &self.execution;
        if execution.max_analyze_runs == 0 {
            return Err(ConfigError::Invalid(
                "execution.max_analyze_runs must be at least 1".to_string(),
            ));
        }
        if execution.default_analyze_runs == 0
            || execution.default_analyze_runs > execution.max_analyze_runs
        {
            return Err(ConfigError::Invalid(format!(
                "execution.default_analyze_runs must be between 1 and {}",
                execution.max_analyze_runs
            )));
        }
        if execution.default_preview_rows == 0 {
            return Err(ConfigError::Invalid(
                "execution.default_preview_rows must be at least 1".to_string(),
            ));
        }

        if self.validation.max_query_bytes == 0 || self.validation.max_identifier_length == 0 {
            return Err(ConfigError::Invalid(
                "validation limits must be at least 1".to_string(),
            ));
        }

        for pattern in execution
            .expensive_patterns
            .iter()
            .chain(self.validation.denylist.iter())
        {
            Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let config = GatewayConfig::default();
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_entries, 512);
        assert_eq!(config.rate_limits.per_minute.get(OperationKind::QueryExecution), 30);
        assert_eq!(config.rate_limits.per_minute.get(OperationKind::Export), 10);
        assert_eq!(
            config.timeouts.get(OperationKind::Export),
            Duration::from_secs(300)
        );
        assert_eq!(config.rate_limits.strategy, WindowStrategy::Sliding);
        assert!(!config.validation.denylist.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_section() {
        let toml_str = r#"
[cache]
ttl_secs = 30

[rate_limits]
strategy = "fixed"

[rate_limits.per_minute]
query_execution = 5

[execution]
fallback_on_fault = ["metadata_fetch"]
"#;

        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.max_entries, 512);
        assert_eq!(config.rate_limits.strategy, WindowStrategy::Fixed);
        assert_eq!(config.rate_limits.per_minute.query_execution, 5);
        assert_eq!(config.rate_limits.per_minute.metadata_fetch, 60);
        assert_eq!(
            config.execution.fallback_on_fault,
            vec![OperationKind::MetadataFetch]
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.execution.default_analyze_runs = 50;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GatewayConfig::default();
        config.execution.expensive_patterns = vec!["(unclosed".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Pattern { .. })));

        let mut config = GatewayConfig::default();
        config.timeouts.connection_attempt = 0;
        assert!(config.validate().is_err());
    }
}
