// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for toolpilot
//!
//! Handles loading and saving settings from ~/.toolpilot/settings.json.
//! Every field has a serde default so partial files are accepted.

use serde::{Deserialize, Serialize};

mod io;
mod validation;

/// Main settings structure, stored in ~/.toolpilot/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Agent loop budgets and limits
    #[serde(default)]
    pub agent: AgentSettings,

    /// Conversation size estimation and compaction
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Token pricing used for cost estimates
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    /// Model identifier passed to the LLM client
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum number of tool-use rounds before the forced summary
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Estimated token budget for the conversation sent to the model
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,

    /// Number of most recent messages the compactor never touches
    #[serde(default = "default_protected_tail_size")]
    pub protected_tail_size: usize,

    /// Tools whose results reflect live external state and are never cached
    #[serde(default = "default_cache_exempt_tools")]
    pub cache_exempt_tools: Vec<String>,

    /// Character ceiling for a single tool result
    #[serde(default = "default_result_truncation_limit")]
    pub result_truncation_limit: usize,

    /// Maximum tokens for each LLM response
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Timeout for a single LLM call in seconds (0 disables)
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Timeout for a single tool execution in seconds (0 disables)
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Interleaved assistant text shorter than this is not forwarded to observers
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    /// Iterations treated as the research phase
    #[serde(default = "default_research_iterations")]
    pub research_iterations: u32,
}

/// Conversation and token estimation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationConfig {
    /// Estimated characters per token for calculations
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u32,

    /// Overhead tokens per message for metadata
    #[serde(default = "default_message_overhead_tokens")]
    pub message_overhead_tokens: u32,

    /// Maximum number of messages kept in a conversation
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Tool results at or below this length are never compacted
    #[serde(default = "default_compaction_min_chars")]
    pub compaction_min_chars: usize,

    /// Characters of a compacted tool result kept as a prefix
    #[serde(default = "default_compaction_keep_chars")]
    pub compaction_keep_chars: usize,
}

/// Token pricing in USD
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    /// Input cost per 1K tokens (USD)
    #[serde(default = "default_input_cost_per_1k")]
    pub input_cost_per_1k: f64,

    /// Output cost per 1K tokens (USD)
    #[serde(default = "default_output_cost_per_1k")]
    pub output_cost_per_1k: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_iterations: default_max_iterations(),
            token_budget: default_token_budget(),
            protected_tail_size: default_protected_tail_size(),
            cache_exempt_tools: default_cache_exempt_tools(),
            result_truncation_limit: default_result_truncation_limit(),
            max_response_tokens: default_max_response_tokens(),
            temperature: default_temperature(),
            llm_timeout_secs: default_llm_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            min_text_length: default_min_text_length(),
            research_iterations: default_research_iterations(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
            message_overhead_tokens: default_message_overhead_tokens(),
            max_entries: default_max_entries(),
            compaction_min_chars: default_compaction_min_chars(),
            compaction_keep_chars: default_compaction_keep_chars(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_cost_per_1k: default_input_cost_per_1k(),
            output_cost_per_1k: default_output_cost_per_1k(),
        }
    }
}

impl PricingConfig {
    /// Estimated cost in USD for the given token counts
    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_iterations() -> u32 {
    25
}

fn default_token_budget() -> u32 {
    100_000
}

fn default_protected_tail_size() -> usize {
    4
}

fn default_cache_exempt_tools() -> Vec<String> {
    vec!["git_status".to_string(), "repo_status".to_string()]
}

fn default_result_truncation_limit() -> usize {
    12_000
}

fn default_max_response_tokens() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_min_text_length() -> usize {
    20
}

fn default_research_iterations() -> u32 {
    3
}

fn default_chars_per_token() -> u32 {
    4
}

fn default_message_overhead_tokens() -> u32 {
    4
}

fn default_max_entries() -> usize {
    200
}

fn default_compaction_min_chars() -> usize {
    500
}

fn default_compaction_keep_chars() -> usize {
    200
}

fn default_input_cost_per_1k() -> f64 {
    0.003
}

fn default_output_cost_per_1k() -> f64 {
    0.015
}
