//! History aggregation against the in-memory backend.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use temporal_mcp::backend::HistoryRequest;
use temporal_mcp::history::{
    EventAttributes, Failure, Payload, WorkflowExecutionStartedAttributes,
};
use temporal_mcp::{
    EventType, HistoryAggregator, HistoryError, HistoryEvent, HistoryFilter, InMemoryBackend,
};
use tokio_util::sync::CancellationToken;

fn started(id: i64, original_run_id: &str) -> HistoryEvent {
    HistoryEvent::new(id, EventType::WorkflowExecutionStarted).with_attributes(
        EventAttributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
            input: None,
            original_execution_run_id: original_run_id.to_string(),
        }),
    )
}

fn aggregator(backend: &Arc<InMemoryBackend>) -> HistoryAggregator {
    let shared: Arc<InMemoryBackend> = Arc::clone(backend);
    HistoryAggregator::new(shared)
}

#[tokio::test]
async fn test_successful_history_uses_original_run_id() {
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "test-workflow-id",
        "test-run-id",
        vec![
            started(1, "original-run-id"),
            HistoryEvent::new(2, EventType::WorkflowExecutionCompleted),
        ],
    ));

    let result = aggregator(&backend)
        .get_history("test-workflow-id", Some("test-run-id"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.workflow_id, "test-workflow-id");
    assert_eq!(result.run_id, "original-run-id");
    assert_eq!(result.events.len(), 2);
    assert_eq!(result.events[0].event_id, 1);
    assert_eq!(result.events[0].event_type, "WorkflowExecutionStarted");
    assert_eq!(result.events[1].event_id, 2);
    assert_eq!(result.events[1].event_type, "WorkflowExecutionCompleted");
    assert_eq!(
        result.summary,
        "Workflow has 2 events. We are examining 2 events."
    );

    assert_eq!(
        backend.history_requests(),
        vec![HistoryRequest {
            workflow_id: "test-workflow-id".to_string(),
            run_id: "test-run-id".to_string(),
            long_poll: false,
            filter: HistoryFilter::AllEvents,
        }]
    );
}

#[tokio::test]
async fn test_iterator_error_discards_partial_result() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_history(
                "test-workflow-id",
                "test-run-id",
                vec![started(1, "r"), HistoryEvent::new(2, EventType::TimerFired)],
            )
            .failing_at("test-workflow-id", "test-run-id", 1, "iterator error"),
    );

    let err = aggregator(&backend)
        .get_history("test-workflow-id", Some("test-run-id"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HistoryError::HistoryRead(_)));
    assert_eq!(err.to_string(), "failed reading history: iterator error");
}

#[tokio::test]
async fn test_error_on_first_pull() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_history("wf", "run", vec![started(1, "r")])
            .failing_at("wf", "run", 0, "iterator error"),
    );

    let err = aggregator(&backend)
        .get_history("wf", Some("run"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "failed reading history: iterator error");
}

#[tokio::test]
async fn test_no_history_events_echoes_run_id() {
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "test-workflow-id",
        "test-run-id",
        Vec::new(),
    ));

    let result = aggregator(&backend)
        .get_history("test-workflow-id", Some("test-run-id"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.workflow_id, "test-workflow-id");
    assert_eq!(result.run_id, "test-run-id");
    assert!(result.events.is_empty());
    assert_eq!(
        result.summary,
        "Workflow has 0 events. We are examining 0 events."
    );
}

#[tokio::test]
async fn test_run_id_not_provided() {
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "test-workflow-id",
        "latest",
        vec![started(1, "original-run-id")],
    ));

    let result = aggregator(&backend)
        .get_history("test-workflow-id", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.run_id, "original-run-id");
    assert_eq!(result.events.len(), 1);
    assert_eq!(
        result.summary,
        "Workflow has 1 events. We are examining 1 events."
    );
    assert_eq!(backend.history_requests()[0].run_id, "");
}

#[tokio::test]
async fn test_started_event_with_empty_original_run_id_still_overrides() {
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "wf",
        "caller-run",
        vec![started(1, "")],
    ));

    let result = aggregator(&backend)
        .get_history("wf", Some("caller-run"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.run_id, "");
}

#[tokio::test]
async fn test_leading_event_without_started_attributes_keeps_caller_run_id() {
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "wf",
        "caller-run",
        vec![
            HistoryEvent::new(1, EventType::WorkflowExecutionStarted),
            started(2, "later"),
        ],
    ));

    let result = aggregator(&backend)
        .get_history("wf", Some("caller-run"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.run_id, "caller-run");
    assert_eq!(result.events.len(), 2);
}

#[tokio::test]
async fn test_filters_and_orders_events() {
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "orders",
        "r1",
        vec![
            started(1, "r1").at(at),
            HistoryEvent::new(2, EventType::WorkflowTaskScheduled).at(at),
            HistoryEvent::new(3, EventType::WorkflowTaskStarted).at(at),
            HistoryEvent::new(4, EventType::ActivityTaskFailed)
                .at(at)
                .with_attributes(EventAttributes::ActivityTaskFailed {
                    failure: Some(Failure::new("card declined")),
                }),
            HistoryEvent::new(5, EventType::WorkflowExecutionCompleted)
                .at(at)
                .with_attributes(EventAttributes::WorkflowExecutionCompleted {
                    result: Some(vec![Payload::json(&json!({"status": "ok"}))].into()),
                }),
        ],
    ));

    let result = aggregator(&backend)
        .get_history("orders", Some("r1"), &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<i64> = result.events.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, vec![1, 4, 5]);
    assert_eq!(
        result.summary,
        "Workflow has 5 events. We are examining 3 events."
    );
    assert_eq!(result.events[1].error(), Some("card declined"));
    assert_eq!(result.events[2].details["input_part_0"], json!({"status": "ok"}));
    assert_eq!(result.events[0].timestamp, "2025-03-01T12:00:00Z");
}

#[tokio::test]
async fn test_cursor_open_failure_is_backend_unavailable() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_history("wf", "run", Vec::new())
            .failing_open("wf", "run", "connection refused"),
    );

    let err = aggregator(&backend)
        .get_history("wf", Some("run"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::BackendUnavailable(_)));
}

#[tokio::test]
async fn test_cancelled_request_stops() {
    let backend = Arc::new(InMemoryBackend::new().with_history(
        "wf",
        "run",
        vec![started(1, "r")],
    ));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = aggregator(&backend)
        .get_history("wf", Some("run"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Cancelled));
}
