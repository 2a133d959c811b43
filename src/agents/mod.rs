// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agentic tool-use loop
//!
//! This module drives a language model through repeated rounds of tool calls
//! until it produces a final answer, the iteration ceiling is reached, or the
//! caller aborts.
//!
//! ## Building blocks
//!
//! - [`runner`] - the loop state machine ([`AgentRunner`], [`run_loop`])
//! - [`memory`] - compaction of old tool results to fit a token budget
//! - [`phase`] - research/action/wrap-up guidance injected after each round
//! - [`context`] - per-invocation identity and the cooperative abort flag
//! - [`registry`] - at most one active loop per session
//! - [`observer`] - progress hooks for UIs and tests
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolpilot::agents::{run_loop, LoopConfig, SessionRegistry};
//! use toolpilot::llm::Conversation;
//!
//! let sessions = SessionRegistry::default();
//! let guard = sessions.acquire("channel-42").await?;
//! let ctx = guard.context("user-7");
//!
//! let mut conversation = Conversation::new();
//! conversation.push_user_text("Why is CI red?");
//!
//! let result = run_loop(provider, registry, &mut conversation, SYSTEM, &ctx, LoopConfig::default()).await?;
//! println!("{} after {} iterations", result.outcome, result.iterations);
//! ```

pub mod context;
pub mod memory;
pub mod observer;
pub mod phase;
pub mod registry;
pub mod runner;
pub mod types;

// Re-export commonly used types
pub use context::{AbortHandle, ExecutionContext};
pub use memory::{compact_to_budget, CompactionPolicy, CompactionReport};
pub use observer::{LoopObserver, NoopLoopObserver, RecordingObserver};
pub use phase::{phase_for, Phase, PhaseTracker};
pub use registry::{SessionGuard, SessionPolicy, SessionRegistry};
pub use runner::{
    run_loop, AgentRunner, ABORT_NOTE, EMPTY_SUMMARY_FALLBACK, SUMMARY_INSTRUCTION,
};
pub use types::{IterationRecord, LoopConfig, LoopOutcome, LoopResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let config = LoopConfig::default();
        let _ = CompactionPolicy::from_config(&config);
        let _ = PhaseTracker::new(config.max_iterations);
        let _ = SessionRegistry::new(SessionPolicy::Queue);
        assert_eq!(phase_for(1, 10), Phase::Research);
        assert_eq!(LoopOutcome::Completed.to_string(), "completed");
    }
}
