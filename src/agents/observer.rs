// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Observability hooks for the agent loop
//!
//! Hooks fire synchronously from the loop. An implementation that blocks
//! stalls the loop.

use crate::tools::ToolResult;

use super::memory::CompactionReport;
use super::types::{IterationRecord, LoopResult};

/// Receives progress events from a running loop
pub trait LoopObserver: Send {
    /// Interleaved assistant text that accompanies tool calls
    fn on_text(&mut self, _text: &str) {}

    /// Tool names requested in the current round, in request order
    fn on_tool_start(&mut self, _tool_names: &[String]) {}

    /// A tool finished (or was served from the cache)
    fn on_tool_complete(&mut self, _tool_name: &str, _result: &ToolResult) {}

    /// Older tool results were compacted to fit the token budget
    fn on_compacted(&mut self, _report: &CompactionReport) {}

    /// An LLM call completed
    fn on_iteration(&mut self, _record: &IterationRecord) {}

    /// The loop reached a terminal state
    fn on_finish(&mut self, _result: &LoopResult) {}
}

/// No-op observer for callers that don't need output hooks.
#[derive(Debug, Default)]
pub struct NoopLoopObserver;

impl LoopObserver for NoopLoopObserver {}

/// Observer that records every event, for tests and diagnostics
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub texts: Vec<String>,
    pub tool_starts: Vec<Vec<String>>,
    pub tool_completions: Vec<(String, bool)>,
    pub compactions: Vec<CompactionReport>,
    pub iterations: Vec<IterationRecord>,
    pub finished: Option<LoopResult>,
}

impl LoopObserver for RecordingObserver {
    fn on_text(&mut self, text: &str) {
        self.texts.push(text.to_string());
    }

    fn on_tool_start(&mut self, tool_names: &[String]) {
        self.tool_starts.push(tool_names.to_vec());
    }

    fn on_tool_complete(&mut self, tool_name: &str, result: &ToolResult) {
        self.tool_completions
            .push((tool_name.to_string(), result.is_error()));
    }

    fn on_compacted(&mut self, report: &CompactionReport) {
        self.compactions.push(*report);
    }

    fn on_iteration(&mut self, record: &IterationRecord) {
        self.iterations.push(record.clone());
    }

    fn on_finish(&mut self, result: &LoopResult) {
        self.finished = Some(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_observer_accepts_all_events() {
        let mut observer = NoopLoopObserver;
        observer.on_text("hello");
        observer.on_tool_start(&["a".to_string()]);
        observer.on_tool_complete("a", &ToolResult::success("t1", "ok"));
    }

    #[test]
    fn test_recording_observer() {
        let mut observer = RecordingObserver::default();
        observer.on_text("thinking about it");
        observer.on_tool_start(&["search".to_string(), "read".to_string()]);
        observer.on_tool_complete("search", &ToolResult::error("t1", "boom"));

        assert_eq!(observer.texts, vec!["thinking about it"]);
        assert_eq!(observer.tool_starts[0], vec!["search", "read"]);
        assert_eq!(observer.tool_completions, vec![("search".to_string(), true)]);
        assert!(observer.finished.is_none());
    }
}
