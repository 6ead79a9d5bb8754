//! Selection checks and submission planning
//!
//! Turns the user's selected work items plus the filled group forms into the units the
//! batch controller runs.

use crate::config::NodeFlowConfig;
use crate::error::{FieldValueError, SelectionError};
use crate::field_type::{FieldCatalog, FieldType};
use crate::types::{
    FieldGroup, NodeOperateParams, TemplateId, UnitId, UnitOfWork, WorkItem, WorkflowNode,
};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Nodes of an item that are currently in progress
pub fn in_progress_nodes(item: &WorkItem) -> impl Iterator<Item = &WorkflowNode> {
    item.nodes().iter().filter(|node| node.is_in_progress())
}

/// Items that have a node flow but no node in progress
#[must_use]
pub fn filter_not_in_progress(items: &[WorkItem]) -> Vec<&WorkItem> {
    items
        .iter()
        .filter(|item| item.has_workflow() && in_progress_nodes(item).next().is_none())
        .collect()
}

/// Template shared by every selected item
///
/// # Errors
/// - `SelectionError::Empty` for an empty selection
/// - `SelectionError::NoWorkflow` when any item lacks a node flow, or none has nodes
/// - `SelectionError::MixedTemplates` when items use several templates
pub fn ensure_single_template(items: &[WorkItem]) -> Result<TemplateId, SelectionError> {
    if items.is_empty() {
        return Err(SelectionError::Empty);
    }
    if items.iter().any(|item| !item.has_workflow()) {
        return Err(SelectionError::NoWorkflow);
    }
    if items.iter().all(|item| item.nodes().is_empty()) {
        return Err(SelectionError::NoWorkflow);
    }

    let templates: IndexSet<TemplateId> = items.iter().map(|item| item.template_id).collect();
    match templates.len() {
        1 => Ok(templates[0]),
        count => Err(SelectionError::MixedTemplates { count }),
    }
}

/// Items of a template currently in progress at `node_id`
#[must_use]
pub fn items_at_node<'a>(
    items: &'a [WorkItem],
    node_id: &str,
    template_id: TemplateId,
) -> Vec<&'a WorkItem> {
    items
        .iter()
        .filter(|item| item.template_id == template_id && item.is_at_node(node_id))
        .collect()
}

/// Units ready to hand to the controller
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    /// Units in group order
    pub units: Vec<UnitOfWork<NodeOperateParams>>,
    /// Units dropped by the per-submission cap
    pub truncated: usize,
}

impl SubmissionPlan {
    /// Whether the cap dropped anything
    #[inline]
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated > 0
    }

    /// Unit ids in submission order
    #[must_use]
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units.iter().map(|unit| unit.unit_id).collect()
    }
}

/// Build node-confirm units for every child of every group
///
/// `values` holds the raw form values per group id; a group without values submits no
/// field updates.
///
/// # Errors
/// - `FieldValueError` when a group's values do not fit the catalog
pub fn plan_submission(
    project_key: &str,
    groups: &[FieldGroup],
    node_id: &str,
    values: &HashMap<usize, Map<String, Value>>,
    catalog: &FieldCatalog,
    config: &NodeFlowConfig,
) -> Result<SubmissionPlan, FieldValueError> {
    let mut units = Vec::new();

    for group in groups {
        let fields = match values.get(&group.group_id) {
            Some(raw) => catalog.serialize_values(raw)?,
            None => Vec::new(),
        };
        units.extend(group.children.iter().map(|item| {
            UnitOfWork::new(
                item.id,
                NodeOperateParams {
                    project_key: project_key.to_string(),
                    work_item_type_key: item.work_item_type_key.clone(),
                    work_item_id: item.id,
                    node_id: node_id.to_string(),
                    fields: fields.clone(),
                    work_item_name: item.name.clone(),
                },
            )
        }));
    }

    let truncated = units.len().saturating_sub(config.max_units_per_submit);
    units.truncate(config.max_units_per_submit);
    if truncated > 0 {
        tracing::warn!(
            truncated,
            cap = config.max_units_per_submit,
            "submission exceeds the per-submit cap"
        );
    }

    Ok(SubmissionPlan { units, truncated })
}

/// Initial form values per item, from the values already filled at `node_id`
#[must_use]
pub fn prefill_values(
    items: &[WorkItem],
    node_id: &str,
    template_id: TemplateId,
) -> IndexMap<i64, Map<String, Value>> {
    let mut prefilled = IndexMap::new();
    for item in items_at_node(items, node_id, template_id) {
        let Some(fields) = item.node(node_id).and_then(|node| node.fields.as_ref()) else {
            continue;
        };
        let values: Map<String, Value> = fields
            .iter()
            .map(|entry| {
                let ty = FieldType::from_tag(&entry.field_type_key);
                (entry.field_key.clone(), ty.prefill(&entry.field_value))
            })
            .collect();
        if !values.is_empty() {
            prefilled.insert(item.id, values);
        }
    }
    prefilled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::{FieldDefinition, FieldOption};
    use crate::grouping::group_by_field_signature;
    use crate::types::{FieldEntry, NodeStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(id: i64, template: TemplateId, node: &str, status: NodeStatus) -> WorkItem {
        WorkItem::new(id, template)
            .with_type_key("story")
            .with_fields(vec![FieldEntry::new("priority", "select")])
            .with_nodes(vec![WorkflowNode::new(node, status)])
    }

    #[test]
    fn single_template_is_returned() {
        let items = vec![at(1, 9, "dev", NodeStatus::Doing), at(2, 9, "qa", NodeStatus::Done)];
        assert_eq!(ensure_single_template(&items), Ok(9));
    }

    #[test]
    fn mixed_templates_are_rejected() {
        let items = vec![at(1, 9, "dev", NodeStatus::Doing), at(2, 10, "dev", NodeStatus::Doing)];
        assert_eq!(
            ensure_single_template(&items),
            Err(SelectionError::MixedTemplates { count: 2 })
        );
    }

    #[test]
    fn items_without_workflow_are_rejected() {
        let items = vec![at(1, 9, "dev", NodeStatus::Doing), WorkItem::new(2, 9)];
        assert_eq!(ensure_single_template(&items), Err(SelectionError::NoWorkflow));
        assert_eq!(ensure_single_template(&[]), Err(SelectionError::Empty));
    }

    #[test]
    fn not_in_progress_items_are_reported() {
        let items = vec![
            at(1, 9, "dev", NodeStatus::Doing),
            at(2, 9, "dev", NodeStatus::Done),
            WorkItem::new(3, 9),
        ];
        let filtered: Vec<i64> = filter_not_in_progress(&items).iter().map(|i| i.id).collect();
        assert_eq!(filtered, vec![2]);
    }

    #[test]
    fn items_at_node_checks_template_and_status() {
        let items = vec![
            at(1, 9, "dev", NodeStatus::Doing),
            at(2, 9, "dev", NodeStatus::NotStarted),
            at(3, 10, "dev", NodeStatus::Doing),
        ];
        let ids: Vec<i64> = items_at_node(&items, "dev", 9).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn plan_serializes_group_values_and_caps() {
        let items: Vec<WorkItem> = (1..=4).map(|id| at(id, 9, "dev", NodeStatus::Doing)).collect();
        let groups = group_by_field_signature(&items, Some("dev"));
        let catalog = FieldCatalog::new(vec![FieldDefinition::new("priority", "select")
            .with_options(vec![FieldOption::new("High", "p0")])]);
        let mut raw = Map::new();
        raw.insert("priority".to_string(), json!("p0"));
        let values = HashMap::from([(0, raw)]);
        let config = NodeFlowConfig::default().with_max_units_per_submit(3);

        let plan = plan_submission("space", &groups, "dev", &values, &catalog, &config).unwrap();

        assert_eq!(plan.unit_ids(), vec![1, 2, 3]);
        assert_eq!(plan.truncated, 1);
        assert!(plan.is_truncated());
        let params = &plan.units[0].params;
        assert_eq!(params.project_key, "space");
        assert_eq!(params.work_item_type_key, "story");
        assert_eq!(params.node_id, "dev");
        assert_eq!(params.fields[0].field_value, json!({"value": "p0", "label": "High"}));
    }

    #[test]
    fn plan_without_values_sends_no_fields() {
        let items = vec![at(1, 9, "dev", NodeStatus::Doing)];
        let groups = group_by_field_signature(&items, Some("dev"));

        let plan = plan_submission(
            "space",
            &groups,
            "dev",
            &HashMap::new(),
            &FieldCatalog::default(),
            &NodeFlowConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.units.len(), 1);
        assert!(plan.units[0].params.fields.is_empty());
        assert!(!plan.is_truncated());
    }

    #[test]
    fn prefill_reads_node_values() {
        let node = WorkflowNode::new("dev", NodeStatus::Doing).with_fields(vec![
            FieldEntry::new("tags", "multi_select").with_value(json!([{"value": "a", "label": "A"}])),
            FieldEntry::new("owner", "user").with_value(json!("u1")),
        ]);
        let items = vec![WorkItem::new(1, 9).with_nodes(vec![node]), at(2, 9, "dev", NodeStatus::Doing)];

        let prefilled = prefill_values(&items, "dev", 9);

        assert_eq!(prefilled.len(), 1);
        assert_eq!(prefilled[&1]["tags"], json!(["a"]));
        assert_eq!(prefilled[&1]["owner"], json!(["u1"]));
    }
}
