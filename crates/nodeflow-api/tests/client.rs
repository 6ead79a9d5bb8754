use nodeflow_api::{ApiClient, ApiError, NodeOperateExecutor, QueryExpand};
use nodeflow_core::{
    run_batches, ApiConfig, CancellationToken, ExecutorError, FailureCause, UnitExecutor, UnitOfWork,
    USER_CANCELED,
};
use nodeflow_test_utils::{init_tracing, operate_params};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        ApiConfig::new(server.uri())
            .with_plugin_token("p-1")
            .with_user_key("u-1"),
    )
    .unwrap()
}

fn operate_path(id: i64) -> String {
    format!("/open_api/space/workflow/story/{id}/node/review/operate")
}

struct EchoItems;

impl Respond for EchoItems {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let items: Vec<Value> = body["work_item_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| json!({"id": id, "template_id": 4, "workflow_infos": null}))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"code": 0, "msg": "", "data": items}))
    }
}

#[tokio::test]
async fn template_detail_normalizes_null_node_lists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/open_api/space/template_detail/4"))
        .and(header("X-PLUGIN-TOKEN", "p-1"))
        .and(header("X-USER-KEY", "u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "",
            "data": {
                "template_id": 4,
                "template_name": "Story flow",
                "state_flow_confs": null,
                "workflow_confs": [{"state_key": "review", "name": "Review", "pass_mode": 2}],
                "connections": null
            }
        })))
        .mount(&server)
        .await;

    let template = client(&server).template_detail("space", 4).await.unwrap();

    assert_eq!(template.template_name, "Story flow");
    assert!(template.state_flow_confs.is_empty());
    assert_eq!(template.workflow_confs[0].state_key, "review");
}

#[tokio::test]
async fn work_items_are_queried_in_sequential_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open_api/space/work_item/story/query"))
        .and(body_partial_json(json!({"expand": {"need_workflow": true}})))
        .respond_with(EchoItems)
        .expect(3)
        .mount(&server)
        .await;

    let items = client(&server)
        .query_work_items_batched("space", "story", &[1, 2, 3, 4, 5], 2, QueryExpand::workflow_only())
        .await
        .unwrap();

    let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn fields_drop_legacy_keys() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open_api/space/field/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "",
            "data": [
                {"field_key": "priority", "field_name": "Priority", "field_type_key": "select",
                 "options": [{"label": "High", "value": "p0"}]},
                {"field_key": "issue_operator", "field_name": "Operator", "field_type_key": "user"},
                {"field_key": "issue_reporter", "field_name": "Reporter", "field_type_key": "user"}
            ]
        })))
        .mount(&server)
        .await;

    let fields = client(&server).fields("space", "story").await.unwrap();

    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].field_key, "priority");
    assert_eq!(fields[0].options[0].label, "High");
}

#[tokio::test]
async fn base_url_prefix_is_kept_and_segments_are_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gateway/open_api/my%20space/field/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "",
            "data": [{"field_key": "summary", "field_name": "Summary", "field_type_key": "text"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = ApiClient::new(ApiConfig::new(format!("{}/gateway", server.uri()))).unwrap();

    let fields = client.fields("my space", "story").await.unwrap();

    assert_eq!(fields[0].field_key, "summary");
}

#[tokio::test]
async fn transition_required_fields_lists_form_keys() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open_api/work_item/transition_required_info/get"))
        .and(body_partial_json(json!({"state_key": "review", "work_item_id": 7})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "",
            "data": {"form_items": [
                {"class": "field", "field_type_key": "select", "finished": false, "key": "priority"},
                {"class": "field", "field_type_key": "text", "finished": true, "key": "summary"}
            ]}
        })))
        .mount(&server)
        .await;

    let keys = client(&server)
        .transition_required_fields("space", "story", 7, "review")
        .await
        .unwrap();

    assert_eq!(keys, vec!["priority".to_string(), "summary".to_string()]);
}

#[tokio::test]
async fn error_status_body_becomes_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open_api/space/field/all"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "err": {"msg": "no permission", "log_id": "LOG403"}
        })))
        .mount(&server)
        .await;

    let err = client(&server).fields("space", "story").await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 403, .. }));
    assert_eq!(err.to_string(), "no permission; logID: LOG403");
}

#[tokio::test]
async fn batch_confirm_records_every_failure_kind() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(operate_path(1)))
        .and(body_partial_json(json!({"action": "confirm", "node_id": "review"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "",
            "data": [{"key": "qa", "name": "QA", "type": 2}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(operate_path(2)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 30014,
            "msg": "node already finished",
            "logId": "LOG2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(operate_path(3)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "err": {"msg": "internal failure", "log_id": "LOG3"}
        })))
        .mount(&server)
        .await;

    let units = (1..=3)
        .map(|id| UnitOfWork::new(id, operate_params(id, "review")))
        .collect();
    let executor = NodeOperateExecutor::new(client(&server));
    let outcome = run_batches(units, NonZeroUsize::new(5).unwrap(), executor)
        .outcome()
        .await;

    assert!(!outcome.is_canceled);
    let next = outcome.all_results[0].data().unwrap();
    assert_eq!(next[0].key, "qa");
    assert_eq!(
        outcome.all_results[1].error_message(),
        Some("node already finished; logID: LOG2")
    );
    assert_eq!(
        outcome.all_results[2].error_message(),
        Some("internal failure; logID: LOG3")
    );
    assert_eq!(outcome.summary().failed, 2);
}

#[tokio::test]
async fn abort_drops_the_in_flight_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(operate_path(1)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 0, "msg": "", "data": []}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let units = vec![
        UnitOfWork::new(1, operate_params(1, "review")),
        UnitOfWork::new(2, operate_params(2, "review")),
    ];
    let handle = run_batches(
        units,
        NonZeroUsize::new(1).unwrap(),
        NodeOperateExecutor::new(client(&server)),
    );
    let abort = handle.abort_handle();
    let (outcome, ()) = tokio::join!(handle.outcome(), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        abort.abort_all(USER_CANCELED);
    });

    assert_eq!(outcome.all_results.len(), 1);
    assert_eq!(outcome.all_results[0].failure_cause(), Some(FailureCause::Cancelled));
    assert!(outcome.is_canceled);
    assert_eq!(outcome.error_message.as_deref(), Some(USER_CANCELED));
}

#[tokio::test]
async fn transport_failure_passes_message_through() {
    let client = ApiClient::new(
        ApiConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let executor = NodeOperateExecutor::new(client);

    let err = executor
        .execute(1, &operate_params(1, "review"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Other(ref message) if message.starts_with("transport error")));
}
