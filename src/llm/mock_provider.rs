// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Provides a scripted implementation of the LlmProvider trait that can be
//! used to drive the agent loop without making real API calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockResponse, LlmProvider, StopReason,
    ToolChoice, Usage,
};

/// A mock LLM provider for testing
///
/// Responses are returned in order; once the script is exhausted the last
/// response repeats. Requests made with `ToolChoice::None` receive the
/// summary response (if configured) and never carry tool calls.
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted responses
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Response used when tools are disabled
    summary: Arc<Mutex<Option<MockResponse>>>,
    /// Call index -> failure message
    failures: Arc<Mutex<HashMap<usize, String>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Text content to return
    pub text: String,
    /// Tool calls to return
    pub tool_calls: Vec<MockToolCall>,
    /// Stop reason
    pub stop_reason: StopReason,
    /// Token usage
    pub usage: Usage,
}

/// A mock tool call
#[derive(Clone, Debug)]
pub struct MockToolCall {
    /// Tool call ID (generated when empty)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input (JSON)
    pub input: serde_json::Value,
}

impl MockToolCall {
    /// Create a tool call with a generated id
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            input,
        }
    }
}

impl MockResponse {
    /// A final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A response requesting the given tool calls
    pub fn tool_calls(calls: Vec<MockToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
            stop_reason: StopReason::ToolUse,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
        }
    }

    /// Add interleaved text to the response
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Override token usage
    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Usage {
            input_tokens,
            output_tokens,
        };
        self
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec![MockResponse::default()])),
            summary: Arc::new(Mutex::new(None)),
            failures: Arc::new(Mutex::new(HashMap::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(vec![MockResponse::text(text)])
    }

    /// Replace the response script (returned in order, last one repeats)
    pub fn with_script(self, script: Vec<MockResponse>) -> Self {
        {
            let mut responses = lock(&self.responses);
            responses.clear();
            responses.extend(script);
        }
        self
    }

    /// Respond to every tool-enabled request with the same tool call
    pub fn with_tool_call(self, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.with_script(vec![MockResponse::tool_calls(vec![MockToolCall::new(
            name, input,
        )])])
    }

    /// Response returned when the request disables tools
    pub fn with_summary_response(self, text: impl Into<String>) -> Self {
        *lock(&self.summary) = Some(MockResponse::text(text));
        self
    }

    /// Fail the given call (0-based) with a network error
    pub fn with_failure_at(self, call_index: usize, message: impl Into<String>) -> Self {
        lock(&self.failures).insert(call_index, message.into());
        self
    }

    /// Get the number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    fn next_response(&self, index: usize, tools_disabled: bool) -> MockResponse {
        if tools_disabled {
            if let Some(summary) = lock(&self.summary).clone() {
                return summary;
            }
        }

        let responses = lock(&self.responses);
        if responses.is_empty() {
            MockResponse::default()
        } else {
            responses[index.min(responses.len() - 1)].clone()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst);
        let tools_disabled = request.tool_choice == ToolChoice::None || request.tools.is_empty();
        let model = request.model.clone();
        lock(&self.recorded_requests).push(request);

        if let Some(message) = lock(&self.failures).get(&index).cloned() {
            return Err(ApiError::Network(message).into());
        }

        let response = self.next_response(index, tools_disabled);
        let mut content = vec![];

        if !response.text.is_empty() {
            content.push(ContentBlockResponse::Text {
                text: response.text,
            });
        }

        let mut stop_reason = response.stop_reason;
        if tools_disabled {
            if stop_reason == StopReason::ToolUse {
                stop_reason = StopReason::EndTurn;
            }
        } else {
            for (i, tool_call) in response.tool_calls.into_iter().enumerate() {
                let id = if tool_call.id.is_empty() {
                    format!("toolu_{}_{}", index, i)
                } else {
                    tool_call.id
                };
                content.push(ContentBlockResponse::ToolUse {
                    id,
                    name: tool_call.name,
                    input: tool_call.input,
                });
            }
        }

        Ok(CompletionResponse {
            id: format!("msg_mock_{}", index),
            model,
            content,
            stop_reason: Some(stop_reason),
            usage: response.usage,
        })
    }
}
