// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Core types for the agent loop
//!
//! Runtime configuration consumed by the runner and the result it returns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::settings::{PricingConfig, Settings};
use crate::llm::provider::StopReason;

/// Runtime configuration for one loop invocation
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Model identifier passed to the provider
    pub model: String,
    /// Tool-use rounds allowed before the forced summary
    pub max_iterations: u32,
    /// Estimated token budget for the conversation
    pub token_budget: u32,
    /// Most recent messages never touched by compaction
    pub protected_tail_size: usize,
    /// Tools whose results are never cached
    pub cache_exempt_tools: Vec<String>,
    /// Character ceiling for a single tool result
    pub result_truncation_limit: usize,
    /// Maximum tokens per LLM response
    pub max_response_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Timeout for one LLM call
    pub llm_timeout: Option<Duration>,
    /// Timeout for one tool execution
    pub tool_timeout: Option<Duration>,
    /// Interleaved text shorter than this is not forwarded to observers
    pub min_text_length: usize,
    /// Iterations reported as the research phase
    pub research_iterations: u32,
    /// Tool results at or below this length are never compacted
    pub compaction_min_chars: usize,
    /// Prefix kept from a compacted tool result
    pub compaction_keep_chars: usize,
    /// Token pricing for the cost estimate
    pub pricing: PricingConfig,
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl LoopConfig {
    /// Build the runtime configuration from persisted settings
    pub fn from_settings(settings: &Settings) -> Self {
        let agent = &settings.agent;
        Self {
            model: agent.model.clone(),
            max_iterations: agent.max_iterations,
            token_budget: agent.token_budget,
            protected_tail_size: agent.protected_tail_size,
            cache_exempt_tools: agent.cache_exempt_tools.clone(),
            result_truncation_limit: agent.result_truncation_limit,
            max_response_tokens: agent.max_response_tokens,
            temperature: agent.temperature,
            llm_timeout: timeout_from_secs(agent.llm_timeout_secs),
            tool_timeout: timeout_from_secs(agent.tool_timeout_secs),
            min_text_length: agent.min_text_length,
            research_iterations: agent.research_iterations,
            compaction_min_chars: settings.conversation.compaction_min_chars,
            compaction_keep_chars: settings.conversation.compaction_keep_chars,
            pricing: settings.pricing.clone(),
        }
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set max iterations
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the token budget
    pub fn with_token_budget(mut self, budget: u32) -> Self {
        self.token_budget = budget;
        self
    }

    /// Set the protected tail size
    pub fn with_protected_tail_size(mut self, size: usize) -> Self {
        self.protected_tail_size = size;
        self
    }

    /// Replace the cache exemption set
    pub fn with_cache_exempt_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_exempt_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set the tool result truncation limit
    pub fn with_result_truncation_limit(mut self, limit: usize) -> Self {
        self.result_truncation_limit = limit;
        self
    }

    /// Set the LLM call timeout
    pub fn with_llm_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.llm_timeout = timeout;
        self
    }

    /// Set the tool execution timeout
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the compaction thresholds
    pub fn with_compaction(mut self, min_chars: usize, keep_chars: usize) -> Self {
        self.compaction_min_chars = min_chars;
        self.compaction_keep_chars = keep_chars;
        self
    }

    /// Set the pricing used for cost estimates
    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// How a loop invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The model produced a response without tool calls
    Completed,
    /// The abort flag was observed
    Aborted,
    /// The iteration ceiling was reached and a summary was forced
    BudgetExhausted,
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopOutcome::Completed => write!(f, "completed"),
            LoopOutcome::Aborted => write!(f, "aborted"),
            LoopOutcome::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Diagnostics for one LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub iteration: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_ms: u64,
    pub stop_reason: Option<StopReason>,
}

/// Result of a loop invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    /// Final text for the caller (may be empty when aborted)
    pub final_response: String,
    /// Number of LLM calls made, including a forced summary
    pub iterations: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Distinct tool names requested by the model
    pub tools_used: BTreeSet<String>,
    pub outcome: LoopOutcome,
    /// One record per LLM call
    pub iterations_log: Vec<IterationRecord>,
}

impl LoopResult {
    /// Total tokens across all calls
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }

    /// Estimated spend in USD
    pub fn estimated_cost_usd(&self, pricing: &PricingConfig) -> f64 {
        pricing.cost_usd(self.total_input_tokens, self.total_output_tokens)
    }

    /// Whether the loop ended because of an abort
    pub fn was_aborted(&self) -> bool {
        self.outcome == LoopOutcome::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_from_default_settings() {
        let config = LoopConfig::default();
        assert_eq!(config.max_iterations, 25);
        assert_eq!(config.token_budget, 100_000);
        assert_eq!(config.protected_tail_size, 4);
        assert_eq!(config.result_truncation_limit, 12_000);
        assert_eq!(config.min_text_length, 20);
        assert_eq!(config.llm_timeout, Some(Duration::from_secs(120)));
        assert!(config.cache_exempt_tools.contains(&"git_status".to_string()));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let mut settings = Settings::default();
        settings.agent.tool_timeout_secs = 0;
        let config = LoopConfig::from_settings(&settings);
        assert!(config.tool_timeout.is_none());
    }

    #[test]
    fn test_builders() {
        let config = LoopConfig::default()
            .with_model("test-model")
            .with_max_iterations(3)
            .with_token_budget(500)
            .with_protected_tail_size(2)
            .with_cache_exempt_tools(["live"])
            .with_result_truncation_limit(100)
            .with_compaction(50, 10)
            .with_tool_timeout(None);

        assert_eq!(config.model, "test-model");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.token_budget, 500);
        assert_eq!(config.protected_tail_size, 2);
        assert_eq!(config.cache_exempt_tools, vec!["live"]);
        assert_eq!(config.result_truncation_limit, 100);
        assert_eq!(
            (config.compaction_min_chars, config.compaction_keep_chars),
            (50, 10)
        );
        assert!(config.tool_timeout.is_none());
    }

    #[test]
    fn test_loop_outcome_display_and_serde() {
        assert_eq!(LoopOutcome::BudgetExhausted.to_string(), "budget_exhausted");
        let json = serde_json::to_string(&LoopOutcome::Aborted).unwrap();
        assert_eq!(json, "\"aborted\"");
    }

    #[test]
    fn test_loop_result_cost() {
        let result = LoopResult {
            final_response: "done".to_string(),
            iterations: 2,
            total_input_tokens: 2000,
            total_output_tokens: 1000,
            tools_used: BTreeSet::new(),
            outcome: LoopOutcome::Completed,
            iterations_log: vec![],
        };
        let pricing = PricingConfig {
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
        };
        assert!((result.estimated_cost_usd(&pricing) - 0.021).abs() < 1e-9);
        assert_eq!(result.total_tokens(), 3000);
        assert!(!result.was_aborted());
    }
}
