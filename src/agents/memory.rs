// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context compaction
//!
//! When the estimated size of a conversation exceeds the token budget, older
//! tool results are rewritten to a short prefix plus a trimmed marker, oldest
//! first, until the estimate fits. Messages are never removed or reordered
//! and the protected tail is never touched. Compaction is lossy.

use crate::llm::message::{ContentBlock, Conversation, Message, Role};

use super::types::LoopConfig;

/// Limits applied by [`compact_to_budget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Estimated token budget
    pub token_budget: u32,
    /// Most recent messages that are never compacted
    pub protected_tail_size: usize,
    /// Tool results at or below this many characters are left alone
    pub min_chars: usize,
    /// Characters kept from a compacted tool result
    pub keep_chars: usize,
}

impl CompactionPolicy {
    /// Policy derived from the loop configuration
    pub fn from_config(config: &LoopConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            protected_tail_size: config.protected_tail_size,
            min_chars: config.compaction_min_chars,
            keep_chars: config.compaction_keep_chars,
        }
    }
}

/// What a compaction pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionReport {
    /// Messages whose tool results were rewritten
    pub trimmed_messages: usize,
    pub tokens_before: u32,
    pub tokens_after: u32,
}

impl CompactionReport {
    /// Whether anything was rewritten
    pub fn changed(&self) -> bool {
        self.trimmed_messages > 0
    }
}

fn trimmed_marker(removed_chars: usize) -> String {
    format!(
        "[trimmed: {} characters removed to save context]",
        removed_chars
    )
}

/// Rewrite a single tool result, or `None` if it is short enough to keep
fn trim_tool_result(content: &str, policy: &CompactionPolicy) -> Option<String> {
    let total = content.chars().count();
    if total <= policy.min_chars {
        return None;
    }

    let prefix: String = content.chars().take(policy.keep_chars).collect();
    let removed = total - prefix.chars().count();
    let trimmed = format!("{}\n{}", prefix, trimmed_marker(removed));

    // Never grow a result.
    (trimmed.chars().count() < total).then_some(trimmed)
}

/// Compacted copy of a user message, or `None` if nothing in it qualifies
fn compact_message(message: &Message, policy: &CompactionPolicy) -> Option<Message> {
    if message.role != Role::User || !message.has_tool_results() {
        return None;
    }

    let mut changed = false;
    let content = message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
                ..
            } => match trim_tool_result(content, policy) {
                Some(trimmed) => {
                    changed = true;
                    ContentBlock::tool_result(tool_use_id.clone(), trimmed, true, *is_error)
                }
                None => block.clone(),
            },
            other => other.clone(),
        })
        .collect();

    changed.then(|| message.replaced_with(content))
}

/// Compact a conversation to fit within a token budget
///
/// Walks messages oldest to newest, excluding the protected tail, rewriting
/// oversized tool results and re-estimating after each message. Stops as soon
/// as the estimate is within budget. A conversation already within budget is
/// left untouched.
pub fn compact_to_budget(
    conversation: &mut Conversation,
    policy: &CompactionPolicy,
) -> CompactionReport {
    let tokens_before = conversation.estimate_tokens();
    let mut report = CompactionReport {
        trimmed_messages: 0,
        tokens_before,
        tokens_after: tokens_before,
    };

    if tokens_before <= policy.token_budget {
        return report;
    }

    let eligible = conversation
        .len()
        .saturating_sub(policy.protected_tail_size);
    let config = conversation.config().clone();
    let mut current = tokens_before;

    for index in 0..eligible {
        let Some(compacted) = compact_message(&conversation.messages()[index], policy) else {
            continue;
        };

        let old_tokens = conversation.messages()[index].estimate_tokens_with_config(&config);
        let new_tokens = compacted.estimate_tokens_with_config(&config);
        conversation.replace(index, compacted);

        current = current.saturating_sub(old_tokens) + new_tokens;
        report.trimmed_messages += 1;

        if current <= policy.token_budget {
            break;
        }
    }

    report.tokens_after = current;

    tracing::debug!(
        target: "toolpilot.agents.memory",
        trimmed = report.trimmed_messages,
        tokens_before = report.tokens_before,
        tokens_after = report.tokens_after,
        budget = policy.token_budget,
        "compacted conversation"
    );

    if current > policy.token_budget {
        tracing::warn!(
            target: "toolpilot.agents.memory",
            tokens = current,
            budget = policy.token_budget,
            "conversation still over budget after compaction"
        );
    }

    report
}
