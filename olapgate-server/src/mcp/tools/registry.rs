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

use crate::mcp::protocol::{CallToolResult, JsonRpcError, Tool};
use async_trait::async_trait;
use dashmap::DashMap;
use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait McpTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError>;
}

/// Decode tool arguments into their typed form.
pub fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Registered tools with their compiled argument schemas
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn McpTool>>,
    validators: DashMap<String, Arc<JSONSchema>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            validators: DashMap::new(),
        }
    }

    pub fn register(&self, tool: Arc<dyn McpTool>) -> Result<(), RegistrationError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistrationError::DuplicateName(name));
        }

        let schema = tool.input_schema();
        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(RegistrationError::Schema(format!(
                "{}: input schema must describe an object",
                name
            )));
        }
        let validator = JSONSchema::options()
            .compile(&schema)
            .map_err(|e| RegistrationError::Schema(format!("{}: {}", name, e)))?;

        self.validators.insert(name.clone(), Arc::new(validator));
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Tool definitions, sorted by name.
    pub fn list(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .tools
            .iter()
            .map(|entry| {
                let tool = entry.value();
                Tool {
                    name: tool.name().to_string(),
                    description: Some(tool.description().to_string()),
                    input_schema: tool.input_schema(),
                }
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute(&self, name: &str, params: Value) -> Result<CallToolResult, ToolError> {
        // Clone out of the shard so no lock is held across the await
        let tool = self
            .tools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let validator = self
            .validators
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        check_arguments(name, &validator, &params)?;
        tool.execute(params).await
    }
}

fn check_arguments(tool: &str, validator: &JSONSchema, params: &Value) -> Result<(), ToolError> {
    if let Err(errors) = validator.validate(params) {
        let reason = errors
            .map(|e| match e.instance_path.to_string() {
                path if path.is_empty() => e.to_string(),
                path => format!("{}: {}", path, e),
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ToolError::InvalidParams {
            tool: tool.to_string(),
            reason,
        });
    }
    Ok(())
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Invalid params for {tool}: {reason}")]
    InvalidParams { tool: String, reason: String },
    #[error("Execution error: {0}")]
    Execution(String),
}

impl From<ToolError> for JsonRpcError {
    fn from(error: ToolError) -> Self {
        match &error {
            ToolError::NotFound(name) => JsonRpcError::method_not_found(name),
            ToolError::InvalidParams { .. } => JsonRpcError::invalid_params(error.to_string()),
            ToolError::Execution(_) => JsonRpcError::internal_error(error.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),
    #[error("Invalid schema: {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        schema: Value,
    }

    #[async_trait]
    impl McpTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the arguments back"
        }

        fn input_schema(&self) -> Value {
            self.schema.clone()
        }

        async fn execute(&self, params: Value) -> Result<CallToolResult, ToolError> {
            CallToolResult::json(&params, false).map_err(|e| ToolError::Execution(e.to_string()))
        }
    }

    fn echo() -> Arc<dyn McpTool> {
        Arc::new(EchoTool {
            schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["text"]
            }),
        })
    }

    #[tokio::test]
    async fn test_arguments_checked_against_schema() {
        let registry = ToolRegistry::new();
        registry.register(echo()).unwrap();

        assert!(registry
            .execute("echo", json!({"text": "hi", "limit": 5}))
            .await
            .is_ok());

        for bad in [json!({"text": "hi", "limit": 0}), json!({"limit": 2}), json!({"text": 7})] {
            match registry.execute("echo", bad.clone()).await {
                Err(ToolError::InvalidParams { tool, .. }) => assert_eq!(tool, "echo"),
                other => panic!("expected invalid params for {}, got {:?}", bad, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_schemas() {
        let registry = ToolRegistry::new();
        registry.register(echo()).unwrap();
        assert!(matches!(
            registry.register(echo()),
            Err(RegistrationError::DuplicateName(_))
        ));

        let registry = ToolRegistry::new();
        let not_object = Arc::new(EchoTool {
            schema: json!({"type": "string"}),
        });
        assert!(matches!(
            registry.register(not_object),
            Err(RegistrationError::Schema(_))
        ));

        let uncompilable = Arc::new(EchoTool {
            schema: json!({"type": "object", "properties": {"n": {"type": "integer", "minimum": "one"}}}),
        });
        assert!(matches!(
            registry.register(uncompilable),
            Err(RegistrationError::Schema(_))
        ));
        assert!(registry.is_empty());
    }
}
