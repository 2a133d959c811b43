// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session registry
//!
//! Maps an external session identifier to at most one in-flight loop. A
//! [`SessionGuard`] holds the slot for the duration of a loop and releases it
//! on drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::{PilotError, Result};

use super::context::{AbortHandle, ExecutionContext};

/// What to do when a session already has an active loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Fail the new request
    #[default]
    Reject,
    /// Wait for the active loop to finish
    Queue,
    /// Abort the active loop, then wait for it to wind down
    InterruptExisting,
}

#[derive(Default)]
struct SessionSlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    active: Mutex<Option<AbortHandle>>,
}

type SlotMap = Mutex<HashMap<String, Arc<SessionSlot>>>;

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop the session's entry if `slot` is idle and only the map and the caller hold it
fn prune_idle(slots: &SlotMap, session_id: &str, slot: &Arc<SessionSlot>) {
    let mut map = lock_unpoisoned(slots);
    let idle = map
        .get(session_id)
        .map(|entry| {
            Arc::ptr_eq(entry, slot)
                && Arc::strong_count(slot) <= 2
                && lock_unpoisoned(&slot.active).is_none()
        })
        .unwrap_or(false);
    if idle {
        map.remove(session_id);
    }
}

/// Registry of active loops keyed by session id
#[derive(Default)]
pub struct SessionRegistry {
    slots: Arc<SlotMap>,
    policy: SessionPolicy,
}

impl SessionRegistry {
    /// Create a registry with the given policy
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    /// The configured policy
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        lock_unpoisoned(&self.slots)
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Claim the session for a new loop according to the policy
    pub async fn acquire(&self, session_id: &str) -> Result<SessionGuard> {
        let slot = self.slot(session_id);

        let permit = match self.policy {
            SessionPolicy::Reject => slot.lock.clone().try_lock_owned().map_err(|_| {
                prune_idle(&self.slots, session_id, &slot);
                tracing::info!(
                    target: "toolpilot.agents.registry",
                    session_id,
                    "rejected request for busy session"
                );
                PilotError::Session(format!(
                    "session '{}' already has an active loop",
                    session_id
                ))
            })?,
            SessionPolicy::Queue => slot.lock.clone().lock_owned().await,
            SessionPolicy::InterruptExisting => {
                let current = lock_unpoisoned(&slot.active).clone();
                if let Some(active) = current {
                    tracing::info!(
                        target: "toolpilot.agents.registry",
                        session_id,
                        "interrupting active loop for new request"
                    );
                    active.request();
                }
                slot.lock.clone().lock_owned().await
            }
        };

        let abort = AbortHandle::new();
        *lock_unpoisoned(&slot.active) = Some(abort.clone());

        tracing::debug!(
            target: "toolpilot.agents.registry",
            session_id,
            "session acquired"
        );

        Ok(SessionGuard {
            session_id: session_id.to_string(),
            abort,
            slot,
            slots: Arc::downgrade(&self.slots),
            _permit: permit,
        })
    }

    /// Request an abort of the session's active loop.
    ///
    /// Returns `false` if the session has no active loop.
    pub fn interrupt(&self, session_id: &str) -> bool {
        let Some(slot) = lock_unpoisoned(&self.slots).get(session_id).cloned() else {
            return false;
        };
        let active = lock_unpoisoned(&slot.active);
        match active.as_ref() {
            Some(handle) => {
                handle.request();
                true
            }
            None => false,
        }
    }

    /// Whether the session has an active loop
    pub fn is_active(&self, session_id: &str) -> bool {
        lock_unpoisoned(&self.slots)
            .get(session_id)
            .map(|slot| lock_unpoisoned(&slot.active).is_some())
            .unwrap_or(false)
    }

    /// Number of sessions currently tracked, active or waiting
    pub fn session_count(&self) -> usize {
        lock_unpoisoned(&self.slots).len()
    }

    /// Sessions with an active loop, sorted
    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = lock_unpoisoned(&self.slots)
            .iter()
            .filter(|(_, slot)| lock_unpoisoned(&slot.active).is_some())
            .map(|(id, _)| id.clone())
            .collect();
        sessions.sort();
        sessions
    }
}

/// Exclusive claim on a session, released on drop
pub struct SessionGuard {
    session_id: String,
    abort: AbortHandle,
    slot: Arc<SessionSlot>,
    slots: Weak<SlotMap>,
    _permit: OwnedMutexGuard<()>,
}

impl SessionGuard {
    /// The session this guard holds
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Abort flag shared with the registry
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Execution context for a loop running under this guard
    pub fn context(&self, user_id: impl Into<String>) -> ExecutionContext {
        ExecutionContext::new(self.session_id.clone(), user_id)
            .with_abort_handle(self.abort_handle())
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        {
            let mut active = lock_unpoisoned(&self.slot.active);
            if active
                .as_ref()
                .map(|handle| handle.same_as(&self.abort))
                .unwrap_or(false)
            {
                *active = None;
            }
        }
        // Queued waiters hold their own reference to the slot
        if let Some(slots) = self.slots.upgrade() {
            prune_idle(&slots, &self.session_id, &self.slot);
        }
        tracing::debug!(
            target: "toolpilot.agents.registry",
            session_id = %self.session_id,
            "session released"
        );
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("session_id", &self.session_id)
            .field("abort_requested", &self.abort.is_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reject_second_request() {
        let registry = SessionRegistry::new(SessionPolicy::Reject);
        let guard = registry.acquire("chan-1").await.unwrap();
        assert!(registry.is_active("chan-1"));

        let err = registry.acquire("chan-1").await.unwrap_err();
        assert!(matches!(err, PilotError::Session(_)));

        // Other sessions are independent
        let other = registry.acquire("chan-2").await.unwrap();
        assert_eq!(registry.active_sessions(), vec!["chan-1", "chan-2"]);

        drop(guard);
        drop(other);
        assert!(!registry.is_active("chan-1"));
        assert!(registry.acquire("chan-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_waits_for_release() {
        let registry = Arc::new(SessionRegistry::new(SessionPolicy::Queue));
        let first = registry.acquire("chan").await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let guard = registry.acquire("chan").await.unwrap();
                guard.abort_handle().is_requested()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert!(!first.abort_handle().is_requested());

        drop(first);
        let second_aborted = waiter.await.unwrap();
        assert!(!second_aborted);
    }

    #[tokio::test]
    async fn test_interrupt_existing_aborts_active_loop() {
        let registry = Arc::new(SessionRegistry::new(SessionPolicy::InterruptExisting));
        let first = registry.acquire("chan").await.unwrap();
        let first_abort = first.abort_handle();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("chan").await.map(|g| g.abort_handle()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first_abort.is_requested());

        drop(first);
        let second_abort = waiter.await.unwrap().unwrap();
        assert!(!second_abort.is_requested());
        assert!(!second_abort.same_as(&first_abort));
    }

    #[tokio::test]
    async fn test_interrupt_by_session_id() {
        let registry = SessionRegistry::default();
        assert!(!registry.interrupt("missing"));

        let guard = registry.acquire("chan").await.unwrap();
        let ctx = guard.context("user-1");
        assert!(registry.interrupt("chan"));
        assert!(ctx.is_abort_requested());
        assert_eq!(ctx.session_id, "chan");

        drop(guard);
        assert!(!registry.interrupt("chan"));
    }

    #[tokio::test]
    async fn test_released_sessions_are_forgotten() {
        let registry = SessionRegistry::new(SessionPolicy::Reject);
        for i in 0..50 {
            let guard = registry.acquire(&format!("chan-{}", i)).await.unwrap();
            assert_eq!(registry.session_count(), 1);
            drop(guard);
        }
        assert_eq!(registry.session_count(), 0);

        let guard = registry.acquire("busy").await.unwrap();
        assert!(registry.acquire("busy").await.is_err());
        assert_eq!(registry.session_count(), 1);
        drop(guard);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_queued_waiter_keeps_slot() {
        let registry = Arc::new(SessionRegistry::new(SessionPolicy::Queue));
        let first = registry.acquire("chan").await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let guard = registry.acquire("chan").await.unwrap();
                let active = registry.is_active("chan");
                let _ = rx.await;
                drop(guard);
                active
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.session_count(), 1);

        tx.send(()).unwrap();
        assert!(waiter.await.unwrap());
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_default_policy_is_reject() {
        assert_eq!(SessionRegistry::default().policy(), SessionPolicy::Reject);
    }
}
