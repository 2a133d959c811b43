// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! Defines the conversation model exchanged with the LLM client, along with
//! the character-based token estimation used to decide when to compact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::settings::ConversationConfig;
use crate::error::{PilotError, Result};

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Content blocks of the message
    pub content: Vec<ContentBlock>,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message (also carries tool results)
    User,
    /// Assistant response
    Assistant,
}

/// A block of content within a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text { text: String },

    /// Tool use request from assistant
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool result from user
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        truncated: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// Synthetic status line injected by the loop, never authored by the model
    StatusNote { text: String },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Create a status note block
    pub fn status_note(text: impl Into<String>) -> Self {
        ContentBlock::StatusNote { text: text.into() }
    }

    /// Create a tool result block
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        truncated: bool,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            truncated,
            is_error,
        }
    }

    /// Number of characters this block contributes to the token estimate
    pub fn estimate_chars(&self) -> usize {
        match self {
            ContentBlock::Text { text } => text.len(),
            ContentBlock::ToolUse { name, input, .. } => name.len() + input.to_string().len(),
            ContentBlock::ToolResult { content, .. } => content.len(),
            ContentBlock::StatusNote { text } => text.len(),
        }
    }
}

impl Message {
    fn with_role(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user text message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, vec![ContentBlock::text(content)])
    }

    /// Create a new assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, vec![ContentBlock::text(content)])
    }

    /// Create a user message from content blocks
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::with_role(Role::User, blocks)
    }

    /// Create an assistant message from content blocks
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::with_role(Role::Assistant, blocks)
    }

    /// Create a replacement for this message carrying new content.
    ///
    /// The identity (id, role, timestamp) is kept so the replacement occupies
    /// the same position in the history.
    pub fn replaced_with(&self, content: Vec<ContentBlock>) -> Self {
        Self {
            id: self.id,
            role: self.role,
            content,
            timestamp: self.timestamp,
        }
    }

    /// Concatenated text blocks of the message, or `None` if there are none
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }

    /// Get all tool use blocks from the message
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
            .collect()
    }

    /// Check if message has any tool use
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }

    /// Check if message carries any tool result
    pub fn has_tool_results(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolResult { .. }))
    }

    /// Total characters across all blocks
    pub fn estimate_chars(&self) -> usize {
        self.content.iter().map(ContentBlock::estimate_chars).sum()
    }

    /// Estimate token count for this message using default config
    pub fn estimate_tokens(&self) -> u32 {
        self.estimate_tokens_with_config(&ConversationConfig::default())
    }

    /// Estimate token count for this message with custom config
    pub fn estimate_tokens_with_config(&self, config: &ConversationConfig) -> u32 {
        let chars_per_token = config.chars_per_token.max(1) as usize;
        (self.estimate_chars() / chars_per_token) as u32 + config.message_overhead_tokens
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Estimate the token count of a slice of messages
///
/// Pure function of content length: a fixed characters-per-token divisor plus
/// a per-message overhead.
pub fn estimate_tokens(messages: &[Message], config: &ConversationConfig) -> u32 {
    messages
        .iter()
        .map(|m| m.estimate_tokens_with_config(config))
        .sum()
}

fn is_plain_user(message: &Message) -> bool {
    message.role == Role::User && !message.has_tool_results()
}

/// Conversation history
///
/// Always starts with a user message once non-empty and never holds more than
/// `config.max_entries` messages.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,

    /// Token estimation and capacity configuration
    config: ConversationConfig,
}

impl Conversation {
    /// Create a new empty conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation with custom configuration
    pub fn with_config(config: ConversationConfig) -> Self {
        Self {
            messages: Vec::new(),
            config,
        }
    }

    /// Build a conversation from existing messages.
    ///
    /// Fails if the first message is not a user message.
    pub fn from_messages(messages: Vec<Message>, config: ConversationConfig) -> Result<Self> {
        let mut conversation = Self::with_config(config);
        for message in messages {
            conversation.push(message);
        }
        conversation.validate()?;
        Ok(conversation)
    }

    /// Get the conversation config
    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Add a message to the conversation, enforcing the entry limit.
    ///
    /// Returns the number of old messages dropped to stay within capacity.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.enforce_capacity()
    }

    /// Append text to the trailing user message, or push a new user message
    /// if the conversation does not end with one.
    pub fn push_user_text(&mut self, text: impl Into<String>) {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::User => {
                last.content.push(ContentBlock::text(text));
            }
            _ => {
                self.push(Message::user(text));
            }
        }
    }

    /// Replace the message at `index` with a rewritten version.
    ///
    /// Used by compaction only; messages are never reordered or removed here.
    pub(crate) fn replace(&mut self, index: usize, message: Message) {
        if let Some(slot) = self.messages.get_mut(index) {
            *slot = message;
        }
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get the last assistant message
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }

    /// Check if the conversation is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Estimate the total token count for the conversation
    pub fn estimate_tokens(&self) -> u32 {
        estimate_tokens(&self.messages, &self.config)
    }

    /// Check the invariants the LLM API relies on
    pub fn validate(&self) -> Result<()> {
        match self.messages.first() {
            None => Err(PilotError::InvalidInput(
                "conversation must contain at least one message".to_string(),
            )),
            Some(first) if first.role != Role::User => Err(PilotError::InvalidInput(
                "conversation must start with a user message".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    fn enforce_capacity(&mut self) -> usize {
        let max_entries = self.config.max_entries.max(1);
        if self.messages.len() <= max_entries {
            return 0;
        }

        // The leading task message is kept; history is dropped right after it.
        let anchored = self
            .messages
            .first()
            .map(is_plain_user)
            .unwrap_or(false);
        let start = usize::from(anchored);

        let mut removed = self.messages.len() - max_entries;
        self.messages.drain(start..start + removed);

        if anchored {
            // Tool results whose assistant turn was dropped are orphans.
            while self
                .messages
                .get(start)
                .map(|m| m.role == Role::User && m.has_tool_results())
                .unwrap_or(false)
            {
                self.messages.remove(start);
                removed += 1;
            }
        } else {
            while self
                .messages
                .first()
                .map(|m| !is_plain_user(m))
                .unwrap_or(false)
            {
                self.messages.remove(0);
                removed += 1;
            }
        }

        tracing::debug!(
            target: "toolpilot.llm.message",
            removed,
            remaining = self.messages.len(),
            "dropped oldest messages to respect max_entries"
        );

        removed
    }
}
