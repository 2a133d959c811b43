// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for toolpilot
//!
//! Tools are typed handlers registered by name. The agent loop never calls a
//! tool directly; it goes through [`ToolExecutor`], which turns every failure
//! into a result the model can read.

pub mod cache;
pub mod definition;
pub mod executor;

pub use cache::*;
pub use definition::*;
pub use executor::*;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::context::ExecutionContext;
use crate::error::Result;
use crate::llm::message::ContentBlock;
use crate::llm::provider::ToolDefinition;

/// Result of tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The tool_use_id this result corresponds to
    pub tool_use_id: String,
    /// The output of the tool
    pub output: ToolOutput,
    /// Whether the output was cut at the truncation limit
    pub truncated: bool,
    /// Wall-clock execution time (zero for cached results)
    pub duration_ms: u64,
}

/// Output from a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Successful output
    Success(String),
    /// Error output, already formatted as `Error: <message>`
    Error(String),
}

impl ToolOutput {
    /// The output text, success or error
    pub fn text(&self) -> &str {
        match self {
            ToolOutput::Success(s) | ToolOutput::Error(s) => s,
        }
    }
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_use_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: ToolOutput::Success(output.into()),
            truncated: false,
            duration_ms: 0,
        }
    }

    /// Create an error result
    pub fn error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: ToolOutput::Error(format!("Error: {}", error.into())),
            truncated: false,
            duration_ms: 0,
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error(_))
    }

    /// Result served from the cache, keeping the original status
    pub fn from_cache(tool_use_id: impl Into<String>, cached: &ToolOutput) -> Self {
        let marked = mark_cached(cached.text());
        let output = match cached {
            ToolOutput::Success(_) => ToolOutput::Success(marked),
            ToolOutput::Error(_) => ToolOutput::Error(marked),
        };
        Self {
            tool_use_id: tool_use_id.into(),
            output,
            truncated: false,
            duration_ms: 0,
        }
    }

    /// Get the output text
    pub fn output_text(&self) -> &str {
        self.output.text()
    }

    /// Convert to a conversation content block
    pub fn into_content_block(self) -> ContentBlock {
        let is_error = self.is_error();
        let content = match self.output {
            ToolOutput::Success(s) | ToolOutput::Error(s) => s,
        };
        ContentBlock::tool_result(self.tool_use_id, content, self.truncated, is_error)
    }
}

/// Trait for implementing tools
///
/// Implementations for tools outside the cache exemption set must be safe to
/// call twice with the same input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool definition for the LLM
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with given input
    async fn execute(&self, input: Value, context: &ExecutionContext) -> Result<String>;
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Aliases mapping alternate names to canonical tool names
    aliases: HashMap<String, String>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Register an alternate name for a tool
    pub fn add_alias(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(alias.into(), canonical.into());
    }

    /// Get a tool by name, resolving aliases if needed
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        if let Some(tool) = self.tools.get(name) {
            return Some(tool);
        }
        self.aliases
            .get(name)
            .and_then(|canonical| self.tools.get(canonical))
    }

    /// Resolve an alias to the canonical tool name
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        if self.tools.contains_key(name) {
            return name;
        }
        self.aliases.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    /// Check if a tool is registered under this name or alias
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get all tool definitions, sorted by name so the catalog is stable
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// List all tool names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a tool input payload to a JSON object.
///
/// Some models send arguments as an encoded JSON string or as `null`.
pub fn normalize_tool_input(input: &Value) -> Value {
    match input {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => serde_json::json!({}),
        },
        Value::Null => serde_json::json!({}),
        _ => input.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: SchemaBuilder::new()
                    .string("text", "Text to echo", true)
                    .build(),
            }
        }

        async fn execute(&self, input: Value, _context: &ExecutionContext) -> Result<String> {
            Ok(input["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.to_string(),
                description: String::new(),
                input_schema: SchemaBuilder::new().build(),
            }
        }

        async fn execute(&self, _input: Value, _context: &ExecutionContext) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("t1", "ok");
        assert!(!result.is_error());
        assert_eq!(result.output_text(), "ok");
        assert!(!result.truncated);
    }

    #[test]
    fn test_tool_result_error_is_prefixed() {
        let result = ToolResult::error("t1", "boom");
        assert!(result.is_error());
        assert_eq!(result.output_text(), "Error: boom");
    }

    #[test]
    fn test_into_content_block() {
        let block = ToolResult::error("t1", "boom").into_content_block();
        assert_eq!(
            block,
            ContentBlock::ToolResult {
                tool_use_id: "t1".to_string(),
                content: "Error: boom".to_string(),
                truncated: false,
                is_error: true,
            }
        );
    }

    #[test]
    fn test_tool_registry_new() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn test_tool_registry_register_and_get() {
        let mut registry = ToolRegistry::default();
        registry.register(Arc::new(EchoTool));
        assert!(registry.contains("echo"));
        assert_eq!(registry.get("echo").map(|t| t.name()), Some("echo"));
    }

    #[test]
    fn test_tool_registry_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("zeta")));
        registry.register(Arc::new(NamedTool("alpha")));
        registry.register(Arc::new(NamedTool("mid")));

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_tool_registry_alias() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.add_alias("say", "echo");

        assert!(registry.contains("say"));
        assert_eq!(registry.resolve_alias("say"), "echo");
        assert_eq!(registry.resolve_alias("echo"), "echo");
        assert_eq!(registry.resolve_alias("other"), "other");
    }

    #[test]
    fn test_direct_name_takes_precedence_over_alias() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("alpha")));
        registry.register(Arc::new(NamedTool("beta")));
        registry.add_alias("alpha", "beta");

        assert_eq!(registry.get("alpha").map(|t| t.name()), Some("alpha"));
        assert_eq!(registry.resolve_alias("alpha"), "alpha");
    }

    #[tokio::test]
    async fn test_tool_execute() {
        let ctx = ExecutionContext::new("session", "user");
        let output = EchoTool.execute(json!({"text": "hi"}), &ctx).await.unwrap();
        assert_eq!(output, "hi");
    }

    #[test]
    fn test_normalize_tool_input() {
        assert_eq!(normalize_tool_input(&Value::Null), json!({}));
        assert_eq!(
            normalize_tool_input(&Value::String(r#"{"a":1}"#.to_string())),
            json!({"a": 1})
        );
        assert_eq!(
            normalize_tool_input(&Value::String("not json".to_string())),
            json!({})
        );
        assert_eq!(normalize_tool_input(&json!({"x": 2})), json!({"x": 2}));
    }
}
