//! Operator tool registry

use super::base::Tool;
use serde_json::Value;
use tracing::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of operator tools, keyed by name
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new tool registry
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if self.tools.insert(tool.name().to_string(), Arc::clone(&tool)).is_some() {
            debug!("Replaced tool {}", tool.name());
        }
    }

    /// Unregister a tool by name
    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool is registered
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool definitions in OpenAI function format, in name order
    pub fn get_definitions(&self) -> Vec<Value> {
        self.tools.values().map(|tool| tool.to_schema()).collect()
    }

    /// Execute a tool by name with given parameters
    ///
    /// Never fails: unknown tools, invalid parameters and execution errors
    /// are rendered into the returned text for the caller to display.
    pub async fn execute(&self, name: &str, params: Value) -> String {
        let tool = match self.tools.get(name) {
            Some(tool) => tool,
            None => return format!("Error: Tool '{}' not found", name),
        };

        // Validate parameters
        let errors = tool.validate_params(&params);
        if !errors.is_empty() {
            return format!(
                "Error: Invalid parameters for tool '{}': {}",
                name,
                errors.join("; ")
            );
        }

        // Execute tool
        match tool.execute(params).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                format!("Error executing {}: {}", name, e)
            }
        }
    }

    /// Registered tool names, in name order
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Get number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ToolError;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, args: Value) -> crate::base::Result<String> {
            match args["text"].as_str() {
                Some("") => Err(ToolError::InvalidArguments("text is empty".to_string())),
                Some(text) => Ok(text.to_string()),
                None => Err(ToolError::InvalidArguments("text must be a string".to_string())),
            }
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert!(registry.has("echo"));
        assert_eq!(registry.get_definitions().len(), 1);

        registry.unregister("echo");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_execute_reports_errors_as_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let ok = registry.execute("echo", serde_json::json!({"text": "hi"})).await;
        assert_eq!(ok, "hi");

        let missing = registry.execute("nope", serde_json::json!({})).await;
        assert_eq!(missing, "Error: Tool 'nope' not found");

        let invalid = registry.execute("echo", serde_json::json!({})).await;
        assert!(invalid.contains("Missing required field: text"));

        let failed = registry.execute("echo", serde_json::json!({"text": ""})).await;
        assert_eq!(failed, "Error executing echo: Invalid arguments: text is empty");
    }
}
