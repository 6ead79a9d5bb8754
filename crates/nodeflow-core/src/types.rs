//! Core types for NodeFlow
//!
//! Defines the fundamental types shared by the controller and the grouping engine:
//! - Units of work and their per-unit results
//! - The aggregated outcome of one controller run
//! - Work items, their field entries and workflow nodes
//! - Field groups produced by the grouping engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of one unit of work (usually a work-item id)
pub type UnitId = i64;

/// Identifier of a workflow template
pub type TemplateId = i64;

/// One independently submittable operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfWork<P> {
    /// Caller supplied id, unique within one run
    pub unit_id: UnitId,
    /// Arguments handed to the executor, opaque to the controller
    pub params: P,
}

impl<P> UnitOfWork<P> {
    /// Create new unit of work
    #[inline]
    #[must_use]
    pub fn new(unit_id: UnitId, params: P) -> Self {
        Self { unit_id, params }
    }
}

/// Successful executor payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSuccess<T> {
    /// Data returned by the remote side
    pub data: T,
    /// When the executor observed completion
    pub completed_at: DateTime<Utc>,
}

impl<T> UnitSuccess<T> {
    /// Success stamped with the current time
    #[inline]
    #[must_use]
    pub fn now(data: T) -> Self {
        Self {
            data,
            completed_at: Utc::now(),
        }
    }
}

/// Why a unit failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCause {
    /// Handle was aborted before the executor was invoked
    AbortedBeforeExecution,
    /// Executor observed the token while the request was in flight
    Cancelled,
    /// Remote service reported an error
    Remote,
    /// Any other raised error
    Other,
}

impl FailureCause {
    /// Whether this failure stems from a cancellation
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::AbortedBeforeExecution | Self::Cancelled)
    }
}

/// Exactly one of success payload or failure message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitOutcome<T> {
    /// Executor completed
    Completed(UnitSuccess<T>),
    /// Unit failed or was skipped
    Failed {
        /// Failure classification
        cause: FailureCause,
        /// Human-readable reason
        error_message: String,
    },
}

/// Result of one unit, echoed back with its params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult<P, T> {
    /// Unit id
    pub unit_id: UnitId,
    /// Original params for correlation
    pub params: P,
    /// Success or failure
    pub outcome: UnitOutcome<T>,
}

impl<P, T> UnitResult<P, T> {
    /// Successful result
    #[inline]
    #[must_use]
    pub fn completed(unit_id: UnitId, params: P, success: UnitSuccess<T>) -> Self {
        Self {
            unit_id,
            params,
            outcome: UnitOutcome::Completed(success),
        }
    }

    /// Failed result
    #[inline]
    #[must_use]
    pub fn failed(
        unit_id: UnitId,
        params: P,
        cause: FailureCause,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            unit_id,
            params,
            outcome: UnitOutcome::Failed {
                cause,
                error_message: error_message.into(),
            },
        }
    }

    /// Whether the unit completed
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Completed(_))
    }

    /// Success payload, if any
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match &self.outcome {
            UnitOutcome::Completed(success) => Some(&success.data),
            UnitOutcome::Failed { .. } => None,
        }
    }

    /// Completion timestamp, if any
    #[inline]
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.outcome {
            UnitOutcome::Completed(success) => Some(success.completed_at),
            UnitOutcome::Failed { .. } => None,
        }
    }

    /// Failure message, if any
    #[inline]
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            UnitOutcome::Completed(_) => None,
            UnitOutcome::Failed { error_message, .. } => Some(error_message),
        }
    }

    /// Failure cause, if any
    #[inline]
    #[must_use]
    pub fn failure_cause(&self) -> Option<FailureCause> {
        match &self.outcome {
            UnitOutcome::Completed(_) => None,
            UnitOutcome::Failed { cause, .. } => Some(*cause),
        }
    }
}

/// Aggregated result of one controller run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome<P, T> {
    /// Results of every issued unit, in input order
    pub all_results: Vec<UnitResult<P, T>>,
    /// Whether the run stopped early
    pub is_canceled: bool,
    /// Why the run stopped early
    pub error_message: Option<String>,
}

impl<P, T> RunOutcome<P, T> {
    /// Count results by cause
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.all_results.len(),
            ..RunSummary::default()
        };
        for result in &self.all_results {
            match result.failure_cause() {
                None => summary.succeeded += 1,
                Some(cause) if cause.is_cancellation() => summary.canceled += 1,
                Some(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Failed and canceled results, in input order
    #[must_use]
    pub fn failures(&self) -> Vec<&UnitResult<P, T>> {
        self.all_results.iter().filter(|r| !r.is_success()).collect()
    }
}

/// Success/cancel/error counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Issued units
    pub total: usize,
    /// Completed units
    pub succeeded: usize,
    /// Units aborted before or during execution
    pub canceled: usize,
    /// Units that failed for any other reason
    pub failed: usize,
}

impl RunSummary {
    /// Whether the failure log has anything to show
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.failed > 0
    }
}

/// Human-readable label for failure-log rows
pub trait Describe {
    /// Display name of the unit (e.g. the work item name)
    fn describe(&self) -> Option<&str>;
}

/// Node status, 1: not started, 2: in progress, 3: done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum NodeStatus {
    /// Not started
    NotStarted,
    /// In progress
    Doing,
    /// Done
    Done,
    /// Status code not known to this version
    Unknown(u8),
}

impl From<u8> for NodeStatus {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::NotStarted,
            2 => Self::Doing,
            3 => Self::Done,
            other => Self::Unknown(other),
        }
    }
}

impl From<NodeStatus> for u8 {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::NotStarted => 1,
            NodeStatus::Doing => 2,
            NodeStatus::Done => 3,
            NodeStatus::Unknown(code) => code,
        }
    }
}

/// One field value carried by a work item or a workflow node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldEntry {
    /// Field key
    pub field_key: String,
    /// Field alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_alias: Option<String>,
    /// Catalog tag of the field type
    #[serde(default)]
    pub field_type_key: String,
    /// Current value
    #[serde(default)]
    pub field_value: Value,
}

impl FieldEntry {
    /// Create new field entry
    #[inline]
    #[must_use]
    pub fn new(field_key: impl Into<String>, field_type_key: impl Into<String>) -> Self {
        Self {
            field_key: field_key.into(),
            field_type_key: field_type_key.into(),
            ..Self::default()
        }
    }

    /// With alias
    #[inline]
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.field_alias = Some(alias.into());
        self
    }

    /// With value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.field_value = value;
        self
    }
}

/// Workflow node instance of a work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Node instance id
    #[serde(default)]
    pub id: String,
    /// State key identifying the node in the template
    pub state_key: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Node status
    pub status: NodeStatus,
    /// Field values filled at this node
    #[serde(default)]
    pub fields: Option<Vec<FieldEntry>>,
}

impl WorkflowNode {
    /// Create new node
    #[inline]
    #[must_use]
    pub fn new(state_key: impl Into<String>, status: NodeStatus) -> Self {
        let state_key = state_key.into();
        Self {
            id: state_key.clone(),
            name: state_key.clone(),
            state_key,
            status,
            fields: None,
        }
    }

    /// With node field values
    #[inline]
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldEntry>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Whether the node is in progress
    #[inline]
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == NodeStatus::Doing
    }
}

/// Workflow information of a work item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowInfo {
    /// Node instances
    #[serde(default)]
    pub workflow_nodes: Option<Vec<WorkflowNode>>,
}

/// A work item as returned by the work-item query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Work item id
    pub id: i64,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Work item type key
    #[serde(default)]
    pub work_item_type_key: String,
    /// Workflow template id
    #[serde(default)]
    pub template_id: TemplateId,
    /// Field entries, first entry drives grouping
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    /// Workflow information, absent for items without a node flow
    #[serde(default)]
    pub workflow_infos: Option<WorkflowInfo>,
}

impl WorkItem {
    /// Create new work item
    #[inline]
    #[must_use]
    pub fn new(id: i64, template_id: TemplateId) -> Self {
        Self {
            id,
            name: format!("work item {id}"),
            work_item_type_key: String::new(),
            template_id,
            fields: Vec::new(),
            workflow_infos: None,
        }
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With type key
    #[inline]
    #[must_use]
    pub fn with_type_key(mut self, key: impl Into<String>) -> Self {
        self.work_item_type_key = key.into();
        self
    }

    /// With field entries
    #[inline]
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldEntry>) -> Self {
        self.fields = fields;
        self
    }

    /// With workflow nodes
    #[inline]
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<WorkflowNode>) -> Self {
        self.workflow_infos = Some(WorkflowInfo {
            workflow_nodes: Some(nodes),
        });
        self
    }

    /// Workflow nodes, empty when absent
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[WorkflowNode] {
        self.workflow_infos
            .as_ref()
            .and_then(|info| info.workflow_nodes.as_deref())
            .unwrap_or_default()
    }

    /// Whether the item has workflow information at all
    #[inline]
    #[must_use]
    pub fn has_workflow(&self) -> bool {
        self.workflow_infos.is_some()
    }

    /// Whether the item currently sits at `state_key`
    #[inline]
    #[must_use]
    pub fn is_at_node(&self, state_key: &str) -> bool {
        self.nodes()
            .iter()
            .any(|n| n.is_in_progress() && n.state_key == state_key)
    }

    /// Node instance by state key
    #[inline]
    #[must_use]
    pub fn node(&self, state_key: &str) -> Option<&WorkflowNode> {
        self.nodes().iter().find(|n| n.state_key == state_key)
    }
}

/// Required-field signature of a work item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldSignature {
    /// First field key
    pub field_key: String,
    /// First field alias
    pub field_alias: Option<String>,
}

impl FieldSignature {
    /// Signature of an item; empty when it lists no fields
    #[must_use]
    pub fn of(item: &WorkItem) -> Self {
        item.fields
            .first()
            .map(|field| Self {
                field_key: field.field_key.clone(),
                field_alias: field.field_alias.clone(),
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Display for FieldSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field_alias {
            Some(alias) => write!(f, "{}-{}", self.field_key, alias),
            None => write!(f, "{}", self.field_key),
        }
    }
}

/// Work items sharing one field signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// Sequential id in first-seen order
    pub group_id: usize,
    /// Shared signature
    pub signature: FieldSignature,
    /// Items of this signature at the target node
    pub children: Vec<WorkItem>,
}

impl FieldGroup {
    /// Whether the group has anything to submit
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// One field update sent with a node transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    /// Field key
    pub field_key: String,
    /// Field alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_alias: Option<String>,
    /// Catalog tag
    pub field_type_key: String,
    /// Serialized value
    pub field_value: Value,
}

/// Params of one node-confirm unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOperateParams {
    /// Project (space) key
    pub project_key: String,
    /// Work item type key
    pub work_item_type_key: String,
    /// Work item id
    pub work_item_id: i64,
    /// Target node state key
    pub node_id: String,
    /// Field updates
    pub fields: Vec<FieldUpdate>,
    /// Display name for the failure log
    pub work_item_name: String,
}

impl Describe for NodeOperateParams {
    fn describe(&self) -> Option<&str> {
        Some(&self.work_item_name)
    }
}
