// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tracing setup for binaries and embedders that want toolpilot's diagnostics.
//!
//! `RUST_LOG` always takes precedence. Without it, warnings and above are
//! shown; `verbosity` 1 adds the loop's debug output and 2 or more adds trace.

use tracing_subscriber::EnvFilter;

use crate::error::{PilotError, Result};

const VERBOSE_TARGETS: &[&str] = &[
    "toolpilot.agents.runner",
    "toolpilot.agents.memory",
    "toolpilot.agents.registry",
    "toolpilot.tools.executor",
    "toolpilot.tools.cache",
    "toolpilot.llm.message",
    "toolpilot.config",
];

/// Build the filter for the given verbosity level
pub fn env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::from_default_env();
    }

    let level = match verbosity {
        0 => return EnvFilter::new("warn"),
        1 => "debug",
        _ => "trace",
    };

    let mut filter = EnvFilter::new("warn");
    for target in VERBOSE_TARGETS {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install a global fmt subscriber
///
/// Fails if a global subscriber is already set.
pub fn init(verbosity: u8) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .try_init()
        .map_err(|e| PilotError::Config(format!("failed to install tracing subscriber: {}", e)))
}
