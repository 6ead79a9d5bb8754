//! Workflow template models and the per-session node-list cache
//!
//! The node list of a template rarely changes during a session, so it is fetched once per
//! template id and kept in a `moka` future cache owned by the session.

use crate::types::TemplateId;
use moka::future::Cache;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How a node is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NodePassMode {
    /// Finishes automatically
    AutoFinish,
    /// One confirmation passes the node
    SingleConfirm,
    /// Every owner must confirm
    MultipleConfirm,
    /// Mode not known to this version
    Other(u8),
}

impl From<u8> for NodePassMode {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::AutoFinish,
            2 => Self::SingleConfirm,
            3 => Self::MultipleConfirm,
            other => Self::Other(other),
        }
    }
}

impl From<NodePassMode> for u8 {
    fn from(mode: NodePassMode) -> Self {
        match mode {
            NodePassMode::AutoFinish => 1,
            NodePassMode::SingleConfirm => 2,
            NodePassMode::MultipleConfirm => 3,
            NodePassMode::Other(code) => code,
        }
    }
}

/// State of a state-flow template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFlowConfig {
    /// State key
    pub state_key: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// State type code
    #[serde(default)]
    pub state_type: i32,
    /// Roles allowed to move into this state
    #[serde(default)]
    pub authorized_roles: Vec<String>,
}

/// Node of a node-flow template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Node state key
    pub state_key: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Pass mode
    #[serde(default = "default_pass_mode")]
    pub pass_mode: NodePassMode,
    /// Owner roles
    #[serde(default)]
    pub owner_roles: Vec<String>,
    /// Fixed owners
    #[serde(default)]
    pub owners: Vec<String>,
    /// Node tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the node carries a schedule
    #[serde(default)]
    pub need_schedule: bool,
}

fn default_pass_mode() -> NodePassMode {
    NodePassMode::SingleConfirm
}

impl WorkflowConfig {
    /// Create new node config
    #[inline]
    #[must_use]
    pub fn new(state_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            state_key: state_key.into(),
            name: name.into(),
            pass_mode: default_pass_mode(),
            owner_roles: Vec::new(),
            owners: Vec::new(),
            tags: Vec::new(),
            need_schedule: false,
        }
    }
}

/// Edge between two template nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Source state key
    pub source_state_key: String,
    /// Target state key
    pub target_state_key: String,
    /// Transition id, state flows only
    #[serde(default)]
    pub transition_id: Option<i64>,
}

/// Workflow template detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTemplate {
    /// Template id
    pub template_id: TemplateId,
    /// Template name
    #[serde(default)]
    pub template_name: String,
    /// Template version
    #[serde(default)]
    pub version: i64,
    /// 1: disabled, 2: enabled
    #[serde(default)]
    pub is_disabled: u8,
    /// States of a state flow; null becomes empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub state_flow_confs: Vec<StateFlowConfig>,
    /// Nodes of a node flow; null becomes empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub workflow_confs: Vec<WorkflowConfig>,
    /// Edges
    #[serde(default, deserialize_with = "null_as_empty")]
    pub connections: Vec<Connection>,
}

impl FlowTemplate {
    /// Whether the template is disabled
    #[inline]
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.is_disabled == 1
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Node lists keyed by template id
#[derive(Debug, Clone)]
pub struct NodeListCache {
    inner: Cache<TemplateId, Arc<Vec<WorkflowConfig>>>,
}

impl NodeListCache {
    /// Cache without eviction beyond `max_capacity`
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Cache whose entries expire after `ttl`
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cached node list
    #[inline]
    pub async fn get(&self, template_id: TemplateId) -> Option<Arc<Vec<WorkflowConfig>>> {
        self.inner.get(&template_id).await
    }

    /// Store a node list
    #[inline]
    pub async fn insert(&self, template_id: TemplateId, nodes: Vec<WorkflowConfig>) {
        self.inner.insert(template_id, Arc::new(nodes)).await;
    }

    /// Cached node list, or load and cache it
    ///
    /// Failed loads are not cached.
    ///
    /// # Errors
    /// Whatever the loader returns.
    pub async fn try_get_or_load<E, F, Fut>(
        &self,
        template_id: TemplateId,
        load: F,
    ) -> Result<Arc<Vec<WorkflowConfig>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<WorkflowConfig>, E>>,
    {
        if let Some(cached) = self.get(template_id).await {
            tracing::trace!(template_id, "node list cache hit");
            return Ok(cached);
        }

        let nodes = Arc::new(load().await?);
        self.inner.insert(template_id, Arc::clone(&nodes)).await;
        tracing::debug!(template_id, nodes = nodes.len(), "cached node list");
        Ok(nodes)
    }

    /// Drop one template's entry
    #[inline]
    pub async fn invalidate(&self, template_id: TemplateId) {
        self.inner.invalidate(&template_id).await;
    }

    /// Drop every entry
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for NodeListCache {
    fn default() -> Self {
        Self::new(1_000)
    }
}
