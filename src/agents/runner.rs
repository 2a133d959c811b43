// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent execution runner
//!
//! This module implements the tool-use loop:
//! - compaction of the conversation before every LLM call
//! - sequential tool dispatch in request order, with a per-loop result cache
//! - cooperative abort checks at the top of each iteration and before each tool
//! - a phase status note after every tool round
//! - a forced, tool-free summary call once the iteration ceiling is reached
//!
//! LLM errors are fatal and propagate to the caller. Tool errors are fed back
//! to the model as results.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::Instrument;

use crate::error::{ApiError, Result};
use crate::llm::message::{ContentBlock, Conversation, Message};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockResponse, LlmProvider, ToolChoice,
    ToolDefinition,
};
use crate::tools::{
    normalize_tool_input, ToolExecutor, ToolInvocation, ToolRegistry, ToolResult,
    ToolResultCache,
};

use super::context::ExecutionContext;
use super::memory::{compact_to_budget, CompactionPolicy};
use super::observer::{LoopObserver, NoopLoopObserver};
use super::phase::PhaseTracker;
use super::types::{IterationRecord, LoopConfig, LoopOutcome, LoopResult};

/// Status note appended when an abort interrupts a tool round
pub const ABORT_NOTE: &str =
    "[aborted] Execution was cancelled by the user. Remaining tool calls were not run.";

/// Instruction appended before the forced summary call
pub const SUMMARY_INSTRUCTION: &str = "You have used all available tool iterations. \
Do not request any more tools. Using only the information already gathered above, \
write your best final answer now. Say clearly what is done, what is still unknown, \
and what the next step would be.";

/// Used when the forced summary comes back empty
pub const EMPTY_SUMMARY_FALLBACK: &str = "I reached the iteration limit before finishing \
and could not produce a summary. The work so far is in the conversation above; ask me to \
continue to pick up from there.";

/// Accumulated state of one invocation
struct LoopState {
    iteration: u32,
    total_input_tokens: u64,
    total_output_tokens: u64,
    tools_used: BTreeSet<String>,
    iterations_log: Vec<IterationRecord>,
    cache: ToolResultCache,
}

impl LoopState {
    fn new(config: &LoopConfig) -> Self {
        Self {
            iteration: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            tools_used: BTreeSet::new(),
            iterations_log: Vec::new(),
            cache: ToolResultCache::new(config.cache_exempt_tools.iter().cloned()),
        }
    }

    fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }

    fn into_result(self, outcome: LoopOutcome, final_response: String) -> LoopResult {
        LoopResult {
            final_response,
            iterations: self.iteration,
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            tools_used: self.tools_used,
            outcome,
            iterations_log: self.iterations_log,
        }
    }
}

/// A tool use extracted from a response
struct ToolUse {
    id: String,
    name: String,
    input: Value,
}

fn extract_tool_uses(content: &[ContentBlockResponse]) -> Vec<ToolUse> {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlockResponse::ToolUse { id, name, input } => Some(ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: normalize_tool_input(input),
            }),
            ContentBlockResponse::Text { .. } => None,
        })
        .collect()
}

/// Agent runner that drives the tool-use loop
pub struct AgentRunner {
    /// LLM provider for making API calls
    provider: Arc<dyn LlmProvider>,
    /// Tool dispatch
    executor: ToolExecutor,
    /// Runner configuration
    config: LoopConfig,
}

impl AgentRunner {
    /// Create a new agent runner
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        config: LoopConfig,
    ) -> Self {
        let executor = ToolExecutor::new(registry, config.result_truncation_limit)
            .with_timeout(config.tool_timeout);
        Self {
            provider,
            executor,
            config,
        }
    }

    /// Get the runner configuration
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run the loop to a terminal state without observer hooks
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        system_prompt: &str,
        context: &ExecutionContext,
    ) -> Result<LoopResult> {
        let mut observer = NoopLoopObserver;
        self.run_with_observer(conversation, system_prompt, context, &mut observer)
            .await
    }

    /// Run the loop to a terminal state, reporting progress to `observer`
    pub async fn run_with_observer(
        &self,
        conversation: &mut Conversation,
        system_prompt: &str,
        context: &ExecutionContext,
        observer: &mut dyn LoopObserver,
    ) -> Result<LoopResult> {
        conversation.validate()?;

        let span = context.span().clone();
        let result = self
            .drive(conversation, system_prompt, context, observer)
            .instrument(span)
            .await?;

        observer.on_finish(&result);
        Ok(result)
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        system_prompt: &str,
        context: &ExecutionContext,
        observer: &mut dyn LoopObserver,
    ) -> Result<LoopResult> {
        let config = &self.config;
        let tools = self.executor.tool_definitions();
        let tracker = PhaseTracker::new(config.max_iterations)
            .with_research_iterations(config.research_iterations);
        let policy = CompactionPolicy::from_config(config);
        let mut state = LoopState::new(config);
        let mut last_text = String::new();

        tracing::info!(
            target: "toolpilot.agents.runner",
            model = %config.model,
            max_iterations = config.max_iterations,
            tools = tools.len(),
            messages = conversation.len(),
            "agent loop started"
        );

        while state.iteration < config.max_iterations {
            if context.is_abort_requested() {
                tracing::info!(
                    target: "toolpilot.agents.runner",
                    iteration = state.iteration,
                    "abort observed at iteration boundary"
                );
                return Ok(self.finish(state, LoopOutcome::Aborted, last_text));
            }

            self.compact(conversation, &policy, observer);

            let response = self
                .call_llm(
                    conversation,
                    system_prompt,
                    tools.clone(),
                    ToolChoice::Auto,
                    &mut state,
                    observer,
                )
                .await?;

            let text = response.text();
            conversation.push(Message::assistant_blocks(response.to_message_blocks()));

            if !response.has_tool_use() {
                return Ok(self.finish(state, LoopOutcome::Completed, text));
            }

            let trimmed = text.trim();
            if trimmed.chars().count() >= config.min_text_length {
                observer.on_text(trimmed);
            }
            last_text = text;

            let tool_uses = extract_tool_uses(&response.content);
            let names: Vec<String> = tool_uses.iter().map(|t| t.name.clone()).collect();
            observer.on_tool_start(&names);

            let mut blocks = Vec::with_capacity(tool_uses.len() + 1);
            let mut aborted = false;

            for tool_use in tool_uses {
                if context.is_abort_requested() {
                    aborted = true;
                    break;
                }

                state.tools_used.insert(tool_use.name.clone());
                let result = self
                    .dispatch(&tool_use, context, &mut state.cache)
                    .await;
                observer.on_tool_complete(&tool_use.name, &result);
                blocks.push(result.into_content_block());
            }

            if aborted {
                tracing::info!(
                    target: "toolpilot.agents.runner",
                    iteration = state.iteration,
                    completed_tools = blocks.len(),
                    "abort observed between tool executions"
                );
                blocks.push(ContentBlock::status_note(ABORT_NOTE));
                conversation.push(Message::user_blocks(blocks));
                return Ok(self.finish(state, LoopOutcome::Aborted, last_text));
            }

            let cost = config
                .pricing
                .cost_usd(state.total_input_tokens, state.total_output_tokens);
            blocks.push(tracker.status_note(state.iteration, state.total_tokens(), cost));
            conversation.push(Message::user_blocks(blocks));
        }

        if context.is_abort_requested() {
            tracing::info!(
                target: "toolpilot.agents.runner",
                iteration = state.iteration,
                "abort observed before forced summary"
            );
            return Ok(self.finish(state, LoopOutcome::Aborted, last_text));
        }

        self.forced_summary(conversation, system_prompt, &policy, state, observer)
            .await
    }

    /// One extra call with tools disabled once the iteration ceiling is hit
    async fn forced_summary(
        &self,
        conversation: &mut Conversation,
        system_prompt: &str,
        policy: &CompactionPolicy,
        mut state: LoopState,
        observer: &mut dyn LoopObserver,
    ) -> Result<LoopResult> {
        tracing::info!(
            target: "toolpilot.agents.runner",
            max_iterations = self.config.max_iterations,
            "iteration budget exhausted, forcing summary"
        );

        conversation.push_user_text(SUMMARY_INSTRUCTION);
        self.compact(conversation, policy, observer);

        let response = self
            .call_llm(
                conversation,
                system_prompt,
                Vec::new(),
                ToolChoice::None,
                &mut state,
                observer,
            )
            .await?;

        let text = response.text();
        let summary = if text.trim().is_empty() {
            tracing::warn!(
                target: "toolpilot.agents.runner",
                "forced summary was empty, using fallback"
            );
            EMPTY_SUMMARY_FALLBACK.to_string()
        } else {
            text
        };

        // Tools were disabled, so only the text is kept.
        conversation.push(Message::assistant(summary.clone()));

        Ok(self.finish(state, LoopOutcome::BudgetExhausted, summary))
    }

    fn compact(
        &self,
        conversation: &mut Conversation,
        policy: &CompactionPolicy,
        observer: &mut dyn LoopObserver,
    ) {
        let report = compact_to_budget(conversation, policy);
        if report.changed() {
            observer.on_compacted(&report);
        }
    }

    async fn call_llm(
        &self,
        conversation: &Conversation,
        system_prompt: &str,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolChoice,
        state: &mut LoopState,
        observer: &mut dyn LoopObserver,
    ) -> Result<CompletionResponse> {
        let mut request =
            CompletionRequest::new(self.config.model.clone(), conversation.messages().to_vec())
                .with_max_tokens(self.config.max_response_tokens)
                .with_temperature(self.config.temperature)
                .with_tools(tools)
                .with_tool_choice(tool_choice);
        if !system_prompt.is_empty() {
            request = request.with_system(system_prompt);
        }

        state.iteration += 1;
        let start = Instant::now();

        let outcome = match self.config.llm_timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.complete(request))
                .await
                .unwrap_or_else(|_| Err(ApiError::Timeout.into())),
            None => self.provider.complete(request).await,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    target: "toolpilot.agents.runner",
                    iteration = state.iteration,
                    error = %e,
                    "LLM call failed"
                );
                return Err(e);
            }
        };

        let record = IterationRecord {
            iteration: state.iteration,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
            stop_reason: response.stop_reason,
        };
        state.total_input_tokens += u64::from(record.input_tokens);
        state.total_output_tokens += u64::from(record.output_tokens);

        tracing::debug!(
            target: "toolpilot.agents.runner",
            iteration = record.iteration,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            duration_ms = record.duration_ms,
            stop_reason = ?record.stop_reason,
            "LLM call completed"
        );

        observer.on_iteration(&record);
        state.iterations_log.push(record);
        Ok(response)
    }

    /// Serve a tool use from the cache or execute it
    async fn dispatch(
        &self,
        tool_use: &ToolUse,
        context: &ExecutionContext,
        cache: &mut ToolResultCache,
    ) -> ToolResult {
        let canonical = self.executor.registry().resolve_alias(&tool_use.name);
        let invocation = ToolInvocation::new(canonical, tool_use.input.clone());

        if let Some(cached) = cache.lookup(&invocation) {
            tracing::debug!(
                target: "toolpilot.agents.runner",
                tool_name = %tool_use.name,
                "served tool result from cache"
            );
            return ToolResult::from_cache(&tool_use.id, &cached);
        }

        let result = self
            .executor
            .execute_tool_use(&tool_use.id, &tool_use.name, invocation.input.clone(), context)
            .await;

        cache.store(&invocation, &result.output);
        result
    }

    fn finish(&self, state: LoopState, outcome: LoopOutcome, final_response: String) -> LoopResult {
        let cache_hits = state.cache.hits();
        let result = state.into_result(outcome, final_response);
        tracing::info!(
            target: "toolpilot.agents.runner",
            outcome = %result.outcome,
            iterations = result.iterations,
            input_tokens = result.total_input_tokens,
            output_tokens = result.total_output_tokens,
            tools_used = result.tools_used.len(),
            cache_hits,
            "agent loop finished"
        );
        result
    }
}

/// Run the tool-use loop once
///
/// Convenience wrapper building an [`AgentRunner`] for a single invocation.
pub async fn run_loop(
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    conversation: &mut Conversation,
    system_prompt: &str,
    context: &ExecutionContext,
    config: LoopConfig,
) -> Result<LoopResult> {
    AgentRunner::new(provider, registry, config)
        .run(conversation, system_prompt, context)
        .await
}
