//! Per-unit cancellation handles
//!
//! One [`CancellationToken`] per unit, all children of a run-level token:
//! - Handles are created before any execution starts
//! - Aborts are idempotent; an aborted handle stays aborted
//! - Aborting the run cancels every child token at once

use crate::types::UnitId;
use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Default reason used by [`AbortHandle::abort_all`] callers that have none
pub const USER_CANCELED: &str = "User canceled";

#[derive(Debug)]
struct UnitHandle {
    token: CancellationToken,
    reason: Option<String>,
}

/// Registry of cancellation handles for one controller run
#[derive(Debug)]
pub struct CancellationRegistry {
    run: CancellationToken,
    run_reason: OnceLock<String>,
    handles: DashMap<UnitId, UnitHandle>,
}

impl CancellationRegistry {
    /// Create a handle for every unit id
    ///
    /// Duplicate ids share one handle.
    #[must_use]
    pub fn new(unit_ids: impl IntoIterator<Item = UnitId>) -> Self {
        let run = CancellationToken::new();
        let handles = DashMap::new();
        for unit_id in unit_ids {
            handles.entry(unit_id).or_insert_with(|| UnitHandle {
                token: run.child_token(),
                reason: None,
            });
        }
        Self {
            run,
            run_reason: OnceLock::new(),
            handles,
        }
    }

    /// Token for a unit
    #[inline]
    #[must_use]
    pub fn token(&self, unit_id: UnitId) -> Option<CancellationToken> {
        self.handles.get(&unit_id).map(|h| h.token.clone())
    }

    /// Whether a unit's handle is aborted
    #[inline]
    #[must_use]
    pub fn is_aborted(&self, unit_id: UnitId) -> bool {
        self.handles
            .get(&unit_id)
            .is_some_and(|h| h.token.is_cancelled())
    }

    /// Reason recorded when a unit was aborted
    #[must_use]
    pub fn reason(&self, unit_id: UnitId) -> Option<String> {
        self.handles.get(&unit_id).and_then(|h| {
            h.reason
                .clone()
                .or_else(|| h.token.is_cancelled().then(|| self.run_reason().unwrap_or_default()))
        })
    }

    /// Abort one unit
    ///
    /// Returns `false` when the unit is unknown or already aborted.
    pub fn abort_by_id(&self, unit_id: UnitId, reason: impl Into<String>) -> bool {
        let Some(mut handle) = self.handles.get_mut(&unit_id) else {
            return false;
        };
        if handle.token.is_cancelled() {
            return false;
        }
        handle.reason = Some(reason.into());
        handle.token.cancel();
        true
    }

    /// Abort every outstanding unit and mark the run canceled
    ///
    /// The first reason wins; later calls are no-ops.
    pub fn abort_all(&self, reason: impl Into<String>) {
        if self.run.is_cancelled() {
            return;
        }
        let reason = reason.into();
        for mut entry in self.handles.iter_mut() {
            if !entry.token.is_cancelled() {
                entry.reason = Some(reason.clone());
            }
        }
        let _ = self.run_reason.set(reason);
        self.run.cancel();
    }

    /// Whether run-level cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_run_canceled(&self) -> bool {
        self.run.is_cancelled()
    }

    /// Run-level cancellation reason
    #[inline]
    #[must_use]
    pub fn run_reason(&self) -> Option<String> {
        self.run_reason.get().cloned()
    }

    /// Number of registered handles
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handle is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Cloneable abort capability of one run
#[derive(Debug, Clone)]
pub struct AbortHandle {
    registry: Arc<CancellationRegistry>,
}

impl AbortHandle {
    pub(crate) fn new(registry: Arc<CancellationRegistry>) -> Self {
        Self { registry }
    }

    /// Abort every outstanding unit; batches not started yet are skipped
    #[inline]
    pub fn abort_all(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(%reason, "aborting all units");
        self.registry.abort_all(reason);
    }

    /// Abort one unit; returns whether anything changed
    #[inline]
    pub fn abort_by_id(&self, unit_id: UnitId, reason: impl Into<String>) -> bool {
        let aborted = self.registry.abort_by_id(unit_id, reason);
        tracing::debug!(unit_id, aborted, "abort by id");
        aborted
    }

    /// Whether run-level cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.registry.is_run_canceled()
    }

    /// Underlying registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &CancellationRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_created_for_every_unit() {
        let registry = CancellationRegistry::new([1, 2, 3]);
        assert_eq!(registry.len(), 3);
        assert!(registry.token(2).is_some());
        assert!(registry.token(9).is_none());
        assert!(!registry.is_aborted(1));
    }

    #[test]
    fn abort_by_id_is_idempotent() {
        let registry = CancellationRegistry::new([1, 2]);

        assert!(registry.abort_by_id(1, "first"));
        assert!(!registry.abort_by_id(1, "second"));
        assert!(registry.is_aborted(1));
        assert!(!registry.is_aborted(2));
        assert_eq!(registry.reason(1).as_deref(), Some("first"));
        assert!(!registry.is_run_canceled());
    }

    #[test]
    fn abort_by_unknown_id_does_nothing() {
        let registry = CancellationRegistry::new([1]);
        assert!(!registry.abort_by_id(42, "nope"));
    }

    #[test]
    fn abort_all_cancels_children_and_keeps_first_reason() {
        let registry = CancellationRegistry::new([1, 2, 3]);
        registry.abort_by_id(2, "single");

        registry.abort_all("everything");
        registry.abort_all("again");

        assert!(registry.is_run_canceled());
        assert!((1..=3).all(|id| registry.is_aborted(id)));
        assert_eq!(registry.reason(1).as_deref(), Some("everything"));
        assert_eq!(registry.reason(2).as_deref(), Some("single"));
        assert_eq!(registry.run_reason().as_deref(), Some("everything"));
        assert!(!registry.abort_by_id(3, "late"));
    }

    #[test]
    fn duplicate_ids_share_a_handle() {
        let registry = CancellationRegistry::new([7, 7]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn token_observes_abort() {
        let registry = Arc::new(CancellationRegistry::new([1]));
        let token = registry.token(1).unwrap();
        let handle = AbortHandle::new(Arc::clone(&registry));

        handle.abort_all(USER_CANCELED);
        token.cancelled().await;
        assert!(handle.is_canceled());
    }
}
