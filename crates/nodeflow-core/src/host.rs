//! Host collaborators
//!
//! The embedding host provides contexts, storage, navigation and the container modal.
//! Each capability is a trait so the session can be driven by a real host or by test
//! doubles.

use crate::error::HostError;
use crate::types::{Describe, RunOutcome, UnitId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Host context that may carry a space id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKind {
    /// Plugin configuration page
    Configuration,
    /// Custom control
    Control,
    /// Custom button
    Button,
    /// Custom page
    Page,
    /// Detail tab
    Tab,
    /// View
    View,
}

impl ContextKind {
    /// Order in which contexts are consulted for the project key
    pub const RESOLUTION_ORDER: [ContextKind; 6] = [
        Self::Configuration,
        Self::Control,
        Self::Button,
        Self::Page,
        Self::Tab,
        Self::View,
    ];
}

/// Source of host contexts
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Space id of one context, `None` when the context has none
    async fn space_id(&self, kind: ContextKind) -> Result<Option<String>, HostError>;
}

/// Host key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key
    async fn get(&self, key: &str) -> Result<Option<String>, HostError>;

    /// Write a key
    async fn set(&self, key: &str, value: String) -> Result<(), HostError>;

    /// Delete a key
    async fn remove(&self, key: &str) -> Result<(), HostError>;
}

/// Host navigation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Open a site-relative path
    async fn open(&self, path: &str, new_tab: bool) -> Result<(), HostError>;
}

/// Container modal of the host
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModalControl: Send + Sync {
    /// Submit the modal with a payload
    async fn submit(&self, payload: Value) -> Result<(), HostError>;

    /// Close the modal
    async fn close(&self) -> Result<(), HostError>;
}

/// In-process [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, String>,
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), HostError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HostError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// First non-empty space id across host contexts
///
/// All contexts are queried concurrently. A failed lookup counts as absent. Returns an
/// empty string when no context carries a space id.
pub async fn resolve_project_key(source: &dyn ContextSource) -> String {
    let lookups = ContextKind::RESOLUTION_ORDER.map(|kind| source.space_id(kind));
    let answers = futures::future::join_all(lookups).await;

    ContextKind::RESOLUTION_ORDER
        .iter()
        .zip(answers)
        .find_map(|(kind, answer)| match answer {
            Ok(Some(space)) if !space.is_empty() => Some(space),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(?kind, %err, "context lookup failed");
                None
            }
        })
        .unwrap_or_default()
}

/// Poll `probe` until it reports ready
///
/// Returns the number of polls used.
///
/// # Errors
/// - `HostError::NotReady` when every attempt failed
pub async fn wait_until_ready<F, Fut>(
    mut probe: F,
    interval: Duration,
    attempts: u32,
) -> Result<u32, HostError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=attempts {
        if probe().await {
            return Ok(attempt);
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    tracing::warn!(attempts, "host never became ready");
    Err(HostError::NotReady { attempts })
}

/// Detail page path of a work item
#[must_use]
pub fn work_item_detail_url(simple_name: &str, work_item_type_key: &str, work_item_id: i64) -> String {
    format!("/{simple_name}/{work_item_type_key}/detail/{work_item_id}")
}

/// One row of the failure log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLogRow {
    /// Unit id
    pub work_item_id: UnitId,
    /// Display name
    pub work_item_name: Option<String>,
    /// Failure reason
    pub reason: String,
    /// Detail page path
    pub detail_url: String,
}

/// Failure log of a run, in input order
#[must_use]
pub fn failure_log<P: Describe, T>(
    outcome: &RunOutcome<P, T>,
    simple_name: &str,
    work_item_type_key: &str,
) -> Vec<FailureLogRow> {
    outcome
        .failures()
        .into_iter()
        .map(|result| FailureLogRow {
            work_item_id: result.unit_id,
            work_item_name: result.params.describe().map(str::to_string),
            reason: result.error_message().unwrap_or_default().to_string(),
            detail_url: work_item_detail_url(simple_name, work_item_type_key, result.unit_id),
        })
        .collect()
}

/// Open a failure row's detail page in a new tab
///
/// # Errors
/// Whatever the navigator reports.
pub async fn open_failure_detail(navigator: &dyn Navigator, row: &FailureLogRow) -> Result<(), HostError> {
    navigator.open(&row.detail_url, true).await
}

/// Acknowledge the result dialog: submit the container modal, then close it
///
/// # Errors
/// The first failing modal call.
pub async fn finish_dialog(modal: &dyn ModalControl) -> Result<(), HostError> {
    modal.submit(Value::Object(serde_json::Map::new())).await?;
    modal.close().await
}
