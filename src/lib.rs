// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Toolpilot - budget-aware agentic tool-use loop for LLM chat sessions.
//!
//! The crate drives a language model through rounds of tool calls while
//! keeping the conversation inside a token budget, deduplicating identical
//! tool calls, and guaranteeing a final answer when the iteration ceiling is
//! reached.
//!
//! Architecture highlights:
//! - `agents`: the loop state machine, compaction, phase guidance, sessions
//! - `tools`: tool trait and registry, execution with truncation, result cache
//! - `llm`: message model, token estimation, provider abstraction and mock
//! - `config`: settings loading, validation, and defaults
//! - `logging`: tracing subscriber setup

pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod tools;

pub use error::{PilotError, Result};
