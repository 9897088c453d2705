//! Temporal HTTP backend against a mock frontend.

use std::sync::Arc;

use serde_json::json;
use temporal_mcp::config::TemporalConfig;
use temporal_mcp::{
    BackendError, FailureScanner, HistoryAggregator, HistoryError, HistoryFilter,
    TemporalHttpBackend, WorkflowBackend,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HISTORY_PATH: &str = "/api/v1/namespaces/default/workflows/order-42/history";
const LIST_PATH: &str = "/api/v1/namespaces/default/workflows";

fn backend(server: &MockServer) -> Arc<TemporalHttpBackend> {
    let config = TemporalConfig {
        address: server.uri(),
        namespace: "default".to_string(),
        request_timeout_secs: 5,
        page_size: 0,
    };
    Arc::new(TemporalHttpBackend::from_config(&config).unwrap())
}

fn first_page() -> serde_json::Value {
    json!({
        "history": {"events": [
            {
                "eventId": "1",
                "eventTime": "2025-03-01T12:00:00.123Z",
                "eventType": "EVENT_TYPE_WORKFLOW_EXECUTION_STARTED",
                "workflowExecutionStartedEventAttributes": {
                    "input": {"payloads": [{
                        "metadata": {"encoding": "anNvbi9wbGFpbg=="},
                        "data": "eyJvcmRlciI6NDJ9"
                    }]},
                    "originalExecutionRunId": "run-orig"
                }
            },
            {
                "eventId": "2",
                "eventTime": "2025-03-01T12:00:01Z",
                "eventType": "EVENT_TYPE_WORKFLOW_TASK_SCHEDULED"
            }
        ]},
        "nextPageToken": "cGFnZS0y"
    })
}

fn second_page() -> serde_json::Value {
    json!({
        "history": {"events": [
            {
                "eventId": "3",
                "eventTime": "2025-03-01T12:00:05Z",
                "eventType": "EVENT_TYPE_ACTIVITY_TASK_FAILED",
                "activityTaskFailedEventAttributes": {
                    "failure": {"message": "card declined", "stackTrace": ""}
                }
            }
        ]},
        "nextPageToken": ""
    })
}

async fn mount_history(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .and(query_param("execution.runId", "run-2"))
        .and(query_param("waitNewEvent", "false"))
        .and(query_param(
            "historyEventFilterType",
            "HISTORY_EVENT_FILTER_TYPE_ALL_EVENT",
        ))
        .and(query_param_is_missing("nextPageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page()))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .and(query_param("nextPageToken", "cGFnZS0y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(second_page()))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_history_follows_page_tokens() {
    let server = MockServer::start().await;
    mount_history(&server).await;

    let aggregator = HistoryAggregator::new(backend(&server));
    let result = aggregator
        .get_history("order-42", Some("run-2"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.run_id, "run-orig");
    assert_eq!(
        result.summary,
        "Workflow has 3 events. We are examining 2 events."
    );
    assert_eq!(result.events[0].timestamp, "2025-03-01T12:00:00Z");
    assert_eq!(result.events[0].details["input_part_0"], json!({"order": 42}));
    assert_eq!(result.events[1].error(), Some("card declined"));
}

#[tokio::test]
async fn test_cursor_is_lazy() {
    let server = MockServer::start().await;

    let backend = backend(&server);
    let _cursor = backend
        .get_history("order-42", "run-2", false, HistoryFilter::AllEvents)
        .await
        .unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_not_found_surfaces_as_history_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"code": 5, "message": "workflow execution not found"})),
        )
        .mount(&server)
        .await;

    let err = HistoryAggregator::new(backend(&server))
        .get_history("order-42", None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HistoryError::HistoryRead(BackendError::Status { status: 404, .. })
    ));
    assert_eq!(
        err.to_string(),
        "failed reading history: HTTP error 404: workflow execution not found"
    );
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let mut cursor = backend
        .get_history("order-42", "", false, HistoryFilter::AllEvents)
        .await
        .unwrap();
    let err = cursor.next_event().await.unwrap_err();
    assert!(matches!(err, BackendError::Decode(_)));
}

#[tokio::test]
async fn test_list_open_executions_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("query", r#"ExecutionStatus="Running""#))
        .and(query_param_is_missing("nextPageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "executions": [
                {"execution": {"workflowId": "a", "runId": "r1"}, "status": "WORKFLOW_EXECUTION_STATUS_RUNNING"},
                {"execution": {"workflowId": "b", "runId": "r2"}}
            ],
            "nextPageToken": "bW9yZQ=="
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("nextPageToken", "bW9yZQ=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "executions": [{"execution": {"workflowId": "c", "runId": "r3"}}]
        })))
        .mount(&server)
        .await;

    let executions = backend(&server).list_open_executions().await.unwrap();
    let ids: Vec<(&str, &str)> = executions
        .iter()
        .map(|e| (e.workflow_id.as_str(), e.run_id.as_str()))
        .collect();
    assert_eq!(ids, vec![("a", "r1"), ("b", "r2"), ("c", "r3")]);
}

#[tokio::test]
async fn test_scan_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "executions": [{"execution": {"workflowId": "order-42", "runId": "run-2"}}]
        })))
        .mount(&server)
        .await;
    mount_history(&server).await;

    let failed = FailureScanner::new(backend(&server))
        .scan_failed(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].workflow_id, "order-42");
    assert_eq!(failed[0].run_id, "run-2");
    assert_eq!(failed[0].error, "card declined");
}

#[tokio::test]
async fn test_listing_unavailable_fails_scan() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let err = FailureScanner::new(backend(&server))
        .scan_failed(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "backend unavailable: HTTP error 503: Service Unavailable"
    );
}

#[tokio::test]
async fn test_malformed_payload_and_timeout_degrade_details() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(HISTORY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "history": {"events": [
                {
                    "eventId": "1",
                    "eventType": "EVENT_TYPE_WORKFLOW_EXECUTION_STARTED",
                    "workflowExecutionStartedEventAttributes": {
                        "input": {"payloads": [{"data": "hello world"}]}
                    }
                },
                {
                    "eventId": "2",
                    "eventType": "EVENT_TYPE_TIMER_STARTED",
                    "timerStartedEventAttributes": {"timerId": "t1", "startToFireTimeout": "-1s"}
                },
                {
                    "eventId": "3",
                    "eventType": "EVENT_TYPE_ACTIVITY_TASK_FAILED",
                    "activityTaskFailedEventAttributes": {"failure": {"message": "boom"}}
                }
            ]}
        })))
        .mount(&server)
        .await;

    let result = HistoryAggregator::new(backend(&server))
        .get_history("order-42", Some("run-2"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        result.summary,
        "Workflow has 3 events. We are examining 3 events."
    );
    assert_eq!(
        result.events[0].details["input_part_0"],
        json!({"data": "hello world"})
    );
    assert_eq!(result.events[1].details["timer_id"], "t1");
    assert_eq!(result.events[1].details["timeout"], "0s");
    assert_eq!(result.events[2].error(), Some("boom"));
}
