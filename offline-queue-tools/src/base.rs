//! Base trait for operator tools

use async_trait::async_trait;
use serde_json::Value;

/// An operator-facing command exposed to the host's tool layer
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the tool parameters schema (JSON Schema format)
    fn parameters(&self) -> Value;

    /// Execute the tool with arguments
    async fn execute(&self, args: Value) -> Result<String>;

    /// Check required fields and declared integer types
    fn validate_params(&self, params: &Value) -> Vec<String> {
        let Some(params_obj) = params.as_object() else {
            return vec!["Parameters must be an object".to_string()];
        };

        let schema = self.parameters();
        let mut errors = Vec::new();

        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field_name in required.iter().filter_map(|f| f.as_str()) {
                if !params_obj.contains_key(field_name) {
                    errors.push(format!("Missing required field: {}", field_name));
                }
            }
        }

        if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
            for (key, value) in params_obj {
                let expects_integer = properties
                    .get(key)
                    .and_then(|p| p.get("type"))
                    .and_then(|t| t.as_str())
                    == Some("integer");
                if expects_integer && !value.is_u64() {
                    errors.push(format!("Field {} must be a non-negative integer", key));
                }
            }
        }

        errors
    }

    /// Convert tool to OpenAI function schema format
    fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}

/// Tool errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Queue(#[from] offline_queue_core::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AgeTool;

    #[async_trait]
    impl Tool for AgeTool {
        fn name(&self) -> &str {
            "age"
        }

        fn description(&self) -> &str {
            "Takes an age"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "hours": { "type": "integer" },
                    "note": { "type": "string" }
                },
                "required": ["hours"]
            })
        }

        async fn execute(&self, _args: Value) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_validate_params() {
        let tool = AgeTool;
        assert!(tool.validate_params(&json!({"hours": 3})).is_empty());
        assert!(tool
            .validate_params(&json!({"hours": 3, "note": "x"}))
            .is_empty());
        assert_eq!(
            tool.validate_params(&json!({})),
            vec!["Missing required field: hours"]
        );
        assert_eq!(
            tool.validate_params(&json!({"hours": -1})),
            vec!["Field hours must be a non-negative integer"]
        );
        assert_eq!(
            tool.validate_params(&json!("nope")),
            vec!["Parameters must be an object"]
        );
    }

    #[test]
    fn test_to_schema() {
        let schema = AgeTool.to_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "age");
        assert_eq!(schema["function"]["parameters"]["required"][0], "hours");
    }
}
