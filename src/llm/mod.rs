// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for toolpilot
//!
//! Conversation model and the provider abstraction the agent loop calls.

pub mod message;
pub mod mock_provider;
pub mod provider;

pub use message::*;
pub use provider::*;
