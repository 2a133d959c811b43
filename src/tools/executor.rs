// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution engine
//!
//! Dispatches a tool use to the registry with timing, an optional timeout,
//! error containment and output truncation. Never returns an error: every
//! failure becomes a [`ToolResult`] the model can read.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agents::context::ExecutionContext;
use crate::error::PilotError;
use crate::llm::provider::ToolDefinition;

use super::{ToolOutput, ToolRegistry, ToolResult};

/// Tool executor that handles dispatch, timeouts and truncation
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    truncation_limit: usize,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    /// Create a new executor
    pub fn new(registry: Arc<ToolRegistry>, truncation_limit: usize) -> Self {
        Self {
            registry,
            truncation_limit,
            timeout: None,
        }
    }

    /// Set a per-tool timeout (`None` waits indefinitely)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the tool registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Get tool definitions for the LLM
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Execute a tool use from the LLM response
    pub async fn execute_tool_use(
        &self,
        tool_use_id: &str,
        tool_name: &str,
        input: Value,
        context: &ExecutionContext,
    ) -> ToolResult {
        let start = Instant::now();

        let Some(tool) = self.registry.get(tool_name).cloned() else {
            tracing::warn!(
                target: "toolpilot.tools.executor",
                tool_name,
                "model requested an unknown tool"
            );
            return ToolResult::error(
                tool_use_id,
                PilotError::UnknownTool(tool_name.to_string()).to_string(),
            );
        };

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(input, context)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        target: "toolpilot.tools.executor",
                        tool_name,
                        timeout_ms = limit.as_millis() as u64,
                        "tool execution timed out"
                    );
                    let mut result = ToolResult::error(
                        tool_use_id,
                        format!("tool '{}' timed out after {:?}", tool_name, limit),
                    );
                    result.duration_ms = elapsed_ms(start);
                    return result;
                }
            },
            None => tool.execute(input, context).await,
        };

        let mut result = match outcome {
            Ok(output) => ToolResult::success(tool_use_id, output),
            Err(e) => {
                tracing::debug!(
                    target: "toolpilot.tools.executor",
                    tool_name,
                    error = %e,
                    "tool returned an error"
                );
                ToolResult::error(tool_use_id, e.to_string())
            }
        };

        self.apply_truncation(&mut result);
        result.duration_ms = elapsed_ms(start);

        tracing::debug!(
            target: "toolpilot.tools.executor",
            tool_name,
            duration_ms = result.duration_ms,
            is_error = result.is_error(),
            truncated = result.truncated,
            "tool finished"
        );

        result
    }

    fn apply_truncation(&self, result: &mut ToolResult) {
        let text = match &mut result.output {
            ToolOutput::Success(s) | ToolOutput::Error(s) => s,
        };
        if let Some(truncated) = truncate_output(text, self.truncation_limit) {
            *text = truncated;
            result.truncated = true;
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Notice appended to a truncated tool result
pub fn truncation_notice(shown: usize, total: usize) -> String {
    format!(
        "\n\n[output truncated: showing first {} of {} characters]",
        shown, total
    )
}

/// Cut `output` to `limit` characters plus a truncation notice.
///
/// Returns `None` when the output already fits.
pub fn truncate_output(output: &str, limit: usize) -> Option<String> {
    let total = output.chars().count();
    if total <= limit {
        return None;
    }

    let cut = output
        .char_indices()
        .nth(limit)
        .map(|(index, _)| index)
        .unwrap_or(output.len());

    let mut truncated = String::with_capacity(cut + 64);
    truncated.push_str(&output[..cut]);
    truncated.push_str(&truncation_notice(limit, total));
    Some(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tools::{SchemaBuilder, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedTool {
        name: &'static str,
        output: String,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn definition(&self) -> ToolDefinition {
            SchemaBuilder::new().into_definition(self.name, "fixed output")
        }

        async fn execute(&self, _input: Value, _context: &ExecutionContext) -> Result<String> {
            Ok(self.output.clone())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fails"
        }

        fn definition(&self) -> ToolDefinition {
            SchemaBuilder::new().into_definition("fails", "always fails")
        }

        async fn execute(&self, _input: Value, _context: &ExecutionContext) -> Result<String> {
            Err(PilotError::ToolExecution("repository not found".to_string()))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn definition(&self) -> ToolDefinition {
            SchemaBuilder::new().into_definition("slow", "sleeps")
        }

        async fn execute(&self, _input: Value, _context: &ExecutionContext) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("done".to_string())
        }
    }

    fn executor(limit: usize) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FixedTool {
            name: "short",
            output: "hello".to_string(),
        }));
        registry.register(Arc::new(FixedTool {
            name: "huge",
            output: "x".repeat(50_000),
        }));
        registry.register(Arc::new(FailingTool));
        registry.register(Arc::new(SlowTool));
        ToolExecutor::new(Arc::new(registry), limit)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("s1", "u1")
    }

    #[tokio::test]
    async fn test_success() {
        let result = executor(100)
            .execute_tool_use("t1", "short", json!({}), &ctx())
            .await;
        assert_eq!(result.tool_use_id, "t1");
        assert_eq!(result.output, ToolOutput::Success("hello".to_string()));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_error_is_contained() {
        let result = executor(100)
            .execute_tool_use("t1", "fails", json!({}), &ctx())
            .await;
        assert!(result.is_error());
        assert!(result.output_text().starts_with("Error: "));
        assert!(result.output_text().contains("repository not found"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = executor(100)
            .execute_tool_use("t1", "nope", json!({}), &ctx())
            .await;
        assert!(result.is_error());
        assert_eq!(result.output_text(), "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_large_output_truncated() {
        let result = executor(12_000)
            .execute_tool_use("t1", "huge", json!({}), &ctx())
            .await;
        assert!(result.truncated);
        let notice = truncation_notice(12_000, 50_000);
        assert_eq!(result.output_text().chars().count(), 12_000 + notice.chars().count());
        assert!(result.output_text().ends_with(&notice));
    }

    #[tokio::test]
    async fn test_timeout_becomes_error_result() {
        let executor = executor(100).with_timeout(Some(Duration::from_millis(20)));
        let result = executor
            .execute_tool_use("t1", "slow", json!({}), &ctx())
            .await;
        assert!(result.is_error());
        assert!(result.output_text().contains("tool 'slow' timed out"));
        assert!(result.output_text().ends_with("after 20ms"));
    }

    #[test]
    fn test_truncate_output_fits() {
        assert!(truncate_output("abc", 3).is_none());
        assert!(truncate_output("", 0).is_none());
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let output = "é".repeat(10);
        let truncated = truncate_output(&output, 4).unwrap();
        assert!(truncated.starts_with("éééé\n\n[output truncated"));
        assert!(truncated.contains("first 4 of 10"));
    }
}
