use nodeflow_core::field_type::{FieldDefinition, FieldOption};
use nodeflow_core::host::failure_log;
use nodeflow_core::{
    group_by_field_signature, ExecutorError, FieldCatalog, NodeFlowConfig, NodeFlowSession,
    NodeStatus, SelectionError,
};
use nodeflow_test_utils::{work_item, work_items_from_json, RecordingExecutor};
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::Arc;

#[test]
fn grouping_follows_first_seen_signatures() {
    let items = vec![
        work_item(0, "a", "dev", NodeStatus::Doing),
        work_item(1, "b", "dev", NodeStatus::Doing),
        work_item(2, "a", "dev", NodeStatus::Doing),
    ];

    let groups = group_by_field_signature(&items, None);

    let layout: Vec<(usize, Vec<i64>)> = groups
        .iter()
        .map(|g| (g.group_id, g.children.iter().map(|c| c.id).collect()))
        .collect();
    assert_eq!(layout, vec![(0, vec![0, 2]), (1, vec![1])]);
}

#[test]
fn query_payload_with_missing_workflow_is_rejected() {
    let items = work_items_from_json(
        r#"[
            {"id": 1, "template_id": 4, "fields": [], "workflow_infos": {"workflow_nodes": []}},
            {"id": 2, "template_id": 4, "workflow_infos": null}
        ]"#,
    )
    .unwrap();

    let mut session = NodeFlowSession::new("space", NodeFlowConfig::default());
    assert_eq!(session.load_items(items), Err(SelectionError::NoWorkflow));
}

#[tokio::test]
async fn selection_to_failure_log() {
    let items = work_items_from_json(
        r#"[
            {"id": 11, "name": "Login page", "work_item_type_key": "story", "template_id": 4,
             "fields": [{"field_key": "priority", "field_alias": "prio", "field_type_key": "select"}],
             "workflow_infos": {"workflow_nodes": [{"state_key": "review", "status": 2}]}},
            {"id": 12, "name": "Signup page", "work_item_type_key": "story", "template_id": 4,
             "fields": [{"field_key": "priority", "field_alias": "prio", "field_type_key": "select"}],
             "workflow_infos": {"workflow_nodes": [{"state_key": "review", "status": 2}]}},
            {"id": 13, "name": "Old page", "work_item_type_key": "story", "template_id": 4,
             "fields": [{"field_key": "owner", "field_type_key": "user"}],
             "workflow_infos": {"workflow_nodes": [{"state_key": "review", "status": 3}]}}
        ]"#,
    )
    .unwrap();
    let catalog = FieldCatalog::new(vec![
        FieldDefinition::new("priority", "select")
            .with_alias("prio")
            .with_options(vec![FieldOption::new("High", "p0"), FieldOption::new("Low", "p2")]),
        FieldDefinition::new("issue_reporter", "user"),
    ]);

    let mut session =
        NodeFlowSession::new("space", NodeFlowConfig::default()).with_catalog(catalog);
    assert_eq!(session.load_items(items), Ok(4));
    assert_eq!(session.filtered_out().len(), 1);
    assert_eq!(session.node_batch("review"), 2);

    let mut form = Map::new();
    form.insert("priority".to_string(), json!("p2"));
    let plan = session.plan("review", &HashMap::from([(0, form)])).unwrap();
    assert_eq!(plan.unit_ids(), vec![11, 12]);
    assert_eq!(
        plan.units[1].params.fields[0].field_value,
        json!({"value": "p2", "label": "Low"})
    );

    let executor = RecordingExecutor::new().with_failure(
        12,
        ExecutorError::remote("node is locked", Some("20240601abc".to_string())),
    );
    let outcome = session
        .submit(plan, Arc::new(executor))
        .unwrap()
        .outcome()
        .await;

    let rows = failure_log(&outcome, "proj", "story");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].work_item_name.as_deref(), Some("Signup page"));
    assert_eq!(rows[0].reason, "node is locked; logID: 20240601abc");
    assert_eq!(rows[0].detail_url, "/proj/story/detail/12");
}
