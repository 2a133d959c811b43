// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-request execution context
//!
//! Carries the session identity, the cooperative abort flag and the tracing
//! span every event of one loop invocation is recorded under.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cooperative cancellation flag
///
/// Set from outside the loop (a "stop" action, the session registry). The
/// loop only reads it and never clears it.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new, unset handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the loop stop at its next checkpoint
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Whether two handles share the same flag
    pub fn same_as(&self, other: &AbortHandle) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

/// Context for a single loop invocation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// External session identifier (e.g. a chat channel)
    pub session_id: String,
    /// User on whose behalf the loop runs
    pub user_id: String,
    abort: AbortHandle,
    span: tracing::Span,
}

impl ExecutionContext {
    /// Create a context with a fresh abort flag
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let user_id = user_id.into();
        let span = tracing::info_span!(
            target: "toolpilot.agents.runner",
            "agent_loop",
            session_id = %session_id,
            user_id = %user_id
        );
        Self {
            session_id,
            user_id,
            abort: AbortHandle::new(),
            span,
        }
    }

    /// Share an existing abort flag (e.g. one held by the session registry)
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Handle that can abort this context from another task
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Request an abort
    pub fn request_abort(&self) {
        self.abort.request();
    }

    /// Whether an abort was requested
    pub fn is_abort_requested(&self) -> bool {
        self.abort.is_requested()
    }

    /// Span used as the logging sink for this invocation
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}
