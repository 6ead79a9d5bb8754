//! Wire models of the open API
//!
//! Every response is wrapped in an [`Envelope`]; HTTP error statuses carry an
//! [`ErrorBody`] instead.

use crate::error::ApiError;
use nodeflow_core::{FieldUpdate, WorkflowNode};
use serde::{Deserialize, Serialize};

/// Standard response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<D> {
    /// 0 on success
    pub code: i64,
    /// Message, empty on success
    #[serde(default)]
    pub msg: String,
    /// Payload
    #[serde(default = "Option::default")]
    pub data: Option<D>,
    /// Structured error
    #[serde(default)]
    pub error: Option<EnvelopeError>,
    /// Correlation id
    #[serde(default, rename = "logId")]
    pub log_id: Option<String>,
}

/// Structured error of an envelope
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeError {
    /// Error id
    #[serde(default)]
    pub id: i64,
    /// Localized message
    #[serde(default, rename = "localizedMessage")]
    pub localized_message: Option<LocalizedMessage>,
}

/// Message in one locale
#[derive(Debug, Clone, Deserialize)]
pub struct LocalizedMessage {
    /// Locale tag
    #[serde(default)]
    pub locale: String,
    /// Message text
    #[serde(default)]
    pub message: String,
}

impl<D> Envelope<D> {
    /// Human-readable message; `msg` first, then the localized error
    #[must_use]
    pub fn message(&self) -> String {
        if !self.msg.is_empty() {
            return self.msg.clone();
        }
        self.error
            .as_ref()
            .and_then(|e| e.localized_message.as_ref())
            .map(|m| m.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "remote error".to_string())
    }

    /// Payload of a successful envelope
    ///
    /// # Errors
    /// - `ApiError::Remote` for a non-zero code
    /// - `ApiError::MissingData` when data is absent
    pub fn into_data(self) -> Result<D, ApiError> {
        self.into_optional_data()?.ok_or(ApiError::MissingData)
    }

    /// Payload of a successful envelope, absent data allowed
    ///
    /// # Errors
    /// - `ApiError::Remote` for a non-zero code
    pub fn into_optional_data(self) -> Result<Option<D>, ApiError> {
        if self.code != 0 {
            return Err(ApiError::Remote {
                code: self.code,
                message: self.message(),
                log_id: self.log_id,
            });
        }
        Ok(self.data)
    }
}

/// Body of an HTTP error status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Error detail
    #[serde(default)]
    pub err: ErrorDetail,
}

/// Error detail of an [`ErrorBody`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    /// Message
    #[serde(default)]
    pub msg: String,
    /// Correlation id
    #[serde(default)]
    pub log_id: Option<String>,
}

/// Expansion flags of the work-item query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryExpand {
    /// Include workflow information
    pub need_workflow: bool,
    /// Include rich text
    pub need_multi_text: bool,
    /// Include user details
    pub need_user_detail: bool,
    /// Include sub-task parents
    pub need_sub_task_parent: bool,
    /// Include relation field details
    pub relation_fields_detail: bool,
}

impl QueryExpand {
    /// Only workflow information
    #[must_use]
    pub fn workflow_only() -> Self {
        Self {
            need_workflow: true,
            need_multi_text: false,
            need_user_detail: false,
            need_sub_task_parent: false,
            relation_fields_detail: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WorkItemQuery<'a> {
    pub(crate) project_key: &'a str,
    pub(crate) work_item_type_key: &'a str,
    pub(crate) work_item_ids: &'a [i64],
    pub(crate) expand: QueryExpand,
}

#[derive(Debug, Serialize)]
pub(crate) struct WorkItemRef<'a> {
    pub(crate) project_key: &'a str,
    pub(crate) work_item_type_key: &'a str,
    pub(crate) work_item_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct FieldQuery<'a> {
    pub(crate) project_key: &'a str,
    pub(crate) work_item_type_key: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransitionQuery<'a> {
    pub(crate) project_key: &'a str,
    pub(crate) work_item_type_key: &'a str,
    pub(crate) work_item_id: i64,
    pub(crate) state_key: &'a str,
}

/// Node-operation request body
#[derive(Debug, Clone, Serialize)]
pub struct OperateNodeRequest<'a> {
    /// Always `confirm` for batch transitions
    pub action: &'static str,
    /// Project key
    pub project_key: &'a str,
    /// Work item type key
    pub work_item_type_key: &'a str,
    /// Work item id
    pub work_item_id: i64,
    /// Node state key
    pub node_id: &'a str,
    /// Field updates
    pub fields: &'a [FieldUpdate],
}

/// Node returned after an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNodeRef {
    /// Node key
    pub key: String,
    /// Node name
    #[serde(default)]
    pub name: String,
    /// 1: finishes automatically, 2: needs confirmation
    #[serde(default, rename = "type")]
    pub node_type: i32,
}

/// Workflow of one work item
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WorkflowDetail {
    /// Edges
    #[serde(default)]
    pub connections: Vec<nodeflow_core::node_cache::Connection>,
    /// Node instances
    #[serde(default)]
    pub workflow_nodes: Vec<WorkflowNode>,
}

/// Item of the transition form
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormItem {
    /// Field key
    pub key: String,
    /// Item class
    #[serde(default)]
    pub class: String,
    /// Field type tag
    #[serde(default)]
    pub field_type_key: String,
    /// Whether already filled
    #[serde(default)]
    pub finished: bool,
}

/// Required information for a transition
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct TransitionRequiredInfo {
    /// Form items the transition requires
    #[serde(default)]
    pub form_items: Vec<FormItem>,
}
