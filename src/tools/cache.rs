// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-loop tool result cache
//!
//! Results are keyed by tool name plus a canonical serialization of the
//! input, so logically identical calls collide regardless of key order.
//! A cache lives for exactly one loop invocation.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::ToolOutput;

/// Marker placed in front of a result served from the cache
pub const CACHE_HIT_MARKER: &str = "[cached: identical call already made in this session; \
the result below is a repeat, try a different approach if it did not help]";

/// A tool call as seen by the cache
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Tool name
    pub name: String,
    /// Normalized input arguments
    pub input: Value,
    /// Deterministic key, `None` when the input could not be serialized
    pub cache_key: Option<String>,
}

impl ToolInvocation {
    /// Build an invocation and compute its cache key
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        let name = name.into();
        let cache_key = cache_key(&name, &input);
        Self {
            name,
            input,
            cache_key,
        }
    }
}

/// Serialize a JSON value with object keys in lexicographic order
pub fn canonical_json(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&sort_keys(value))
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Build the cache key for a call, or `None` if the input cannot be serialized
pub fn cache_key(tool_name: &str, input: &Value) -> Option<String> {
    match canonical_json(input) {
        Ok(canonical) => Some(format!("{}:{}", tool_name, canonical)),
        Err(e) => {
            tracing::debug!(
                target: "toolpilot.tools.cache",
                tool_name,
                error = %e,
                "could not build cache key, treating as miss"
            );
            None
        }
    }
}

/// Memoized tool results for a single loop invocation
#[derive(Debug, Default)]
pub struct ToolResultCache {
    entries: HashMap<String, ToolOutput>,
    exempt: HashSet<String>,
    hits: usize,
}

impl ToolResultCache {
    /// Create an empty cache with the given exempt tool names
    pub fn new<I, S>(exempt_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: HashMap::new(),
            exempt: exempt_tools.into_iter().map(Into::into).collect(),
            hits: 0,
        }
    }

    /// Whether results of this tool are never cached
    pub fn is_exempt(&self, tool_name: &str) -> bool {
        self.exempt.contains(tool_name)
    }

    /// Look up a previous result by key
    pub fn get(&mut self, key: &str) -> Option<&ToolOutput> {
        let hit = self.entries.get(key);
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    /// Store a result
    pub fn put(&mut self, key: impl Into<String>, output: ToolOutput) {
        self.entries.insert(key.into(), output);
    }

    /// Cached result for an invocation, honoring the exemption set
    pub fn lookup(&mut self, invocation: &ToolInvocation) -> Option<ToolOutput> {
        if self.is_exempt(&invocation.name) {
            return None;
        }
        let key = invocation.cache_key.as_deref()?;
        self.get(key).cloned()
    }

    /// Record a result for an invocation, honoring the exemption set.
    ///
    /// Errors are cached too, so a failing call is not retried verbatim.
    pub fn store(&mut self, invocation: &ToolInvocation, output: &ToolOutput) {
        if self.is_exempt(&invocation.name) {
            return;
        }
        if let Some(key) = &invocation.cache_key {
            self.put(key.clone(), output.clone());
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups served from the cache
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Annotate a cached result so the model knows it is a repeat
pub fn mark_cached(result: &str) -> String {
    format!("{}\n{}", CACHE_HIT_MARKER, result)
}
