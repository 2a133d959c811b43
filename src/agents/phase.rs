// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Phase tracking for the agent loop
//!
//! The phase is derived from the iteration count alone. After every tool
//! round the loop appends a status note so the model can pace itself; there
//! is no hard stop at [`Phase::Stop`], the iteration ceiling is the backstop.

use serde::{Deserialize, Serialize};

use crate::llm::message::ContentBlock;

/// Iterations reported as research when not configured
pub const DEFAULT_RESEARCH_ITERATIONS: u32 = 3;

const ACTION_RATIO: f64 = 0.7;
const WRAP_UP_RATIO: f64 = 0.9;

/// Coarse lifecycle phase of a loop invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Action,
    WrapUp,
    Stop,
}

impl Phase {
    /// Guidance sent to the model alongside the status line
    pub fn hint(&self) -> &'static str {
        match self {
            Phase::Research => "Gather the information you need before changing anything.",
            Phase::Action => "Make progress on the task with the tools available.",
            Phase::WrapUp => {
                "Budget is running low. Finish the current step and prepare your answer."
            }
            Phase::Stop => "Budget is nearly exhausted. Stop calling tools and answer now.",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Research => write!(f, "research"),
            Phase::Action => write!(f, "action"),
            Phase::WrapUp => write!(f, "wrap_up"),
            Phase::Stop => write!(f, "stop"),
        }
    }
}

/// Phase for an iteration with the default research window
pub fn phase_for(iteration: u32, max_iterations: u32) -> Phase {
    PhaseTracker::new(max_iterations).phase(iteration)
}

/// Maps iteration numbers to phases and renders status notes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTracker {
    max_iterations: u32,
    research_iterations: u32,
}

impl PhaseTracker {
    /// Create a tracker with the default research window
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            research_iterations: DEFAULT_RESEARCH_ITERATIONS,
        }
    }

    /// Override the research window
    pub fn with_research_iterations(mut self, research_iterations: u32) -> Self {
        self.research_iterations = research_iterations;
        self
    }

    /// Phase for a 1-based iteration number
    pub fn phase(&self, iteration: u32) -> Phase {
        if self.max_iterations == 0 {
            return Phase::Stop;
        }
        if iteration <= self.research_iterations {
            return Phase::Research;
        }

        let ratio = iteration as f64 / self.max_iterations as f64;
        if ratio < ACTION_RATIO {
            Phase::Action
        } else if ratio < WRAP_UP_RATIO {
            Phase::WrapUp
        } else {
            Phase::Stop
        }
    }

    /// Machine-readable status line for the model
    pub fn status_text(&self, iteration: u32, total_tokens: u64, cost_usd: f64) -> String {
        let phase = self.phase(iteration);
        format!(
            "[status] iteration={}/{} phase={} tokens={} cost_usd={:.4} | {}",
            iteration,
            self.max_iterations,
            phase,
            total_tokens,
            cost_usd,
            phase.hint()
        )
    }

    /// Status note block appended after a tool round
    pub fn status_note(&self, iteration: u32, total_tokens: u64, cost_usd: f64) -> ContentBlock {
        ContentBlock::status_note(self.status_text(iteration, total_tokens, cost_usd))
    }
}
