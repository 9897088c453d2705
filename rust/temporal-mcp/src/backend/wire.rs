//! Proto-JSON shapes returned by the Temporal frontend HTTP API.
//!
//! int64 fields may arrive as strings or numbers, enums as `EVENT_TYPE_*`
//! names or codes, durations as `"1.5s"`, and payload bytes as base64. Payloads
//! may also arrive in shorthand form, as the plain JSON value they encode.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::history::{
    ActivityTaskScheduledAttributes, EventAttributes, EventType, Failure, HistoryEvent, Payload,
    Payloads, TimerStartedAttributes, UpdateInput, UpdateRequest,
    WorkflowExecutionSignaledAttributes, WorkflowExecutionStartedAttributes,
    WorkflowExecutionUpdateAcceptedAttributes,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetHistoryResponse {
    #[serde(default)]
    pub history: Option<WireHistory>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireHistory {
    #[serde(default)]
    pub events: Vec<WireEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListExecutionsResponse {
    #[serde(default)]
    pub executions: Vec<WireExecutionInfo>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireExecutionInfo {
    #[serde(default)]
    pub execution: WireExecution,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireExecution {
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireEvent {
    #[serde(default, deserialize_with = "int64")]
    event_id: i64,
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    event_type: Option<Value>,
    #[serde(default)]
    workflow_execution_started_event_attributes: Option<WireStarted>,
    #[serde(default)]
    activity_task_scheduled_event_attributes: Option<WireActivityScheduled>,
    #[serde(default)]
    workflow_execution_signaled_event_attributes: Option<WireSignaled>,
    #[serde(default)]
    workflow_execution_update_accepted_event_attributes: Option<WireUpdateAccepted>,
    #[serde(default)]
    activity_task_completed_event_attributes: Option<WireResult>,
    #[serde(default)]
    activity_task_failed_event_attributes: Option<WireFailed>,
    #[serde(default)]
    workflow_execution_completed_event_attributes: Option<WireResult>,
    #[serde(default)]
    workflow_execution_failed_event_attributes: Option<WireFailed>,
    #[serde(default)]
    timer_started_event_attributes: Option<WireTimerStarted>,
    #[serde(default)]
    workflow_task_failed_event_attributes: Option<WireFailed>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStarted {
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    original_execution_run_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireActivityScheduled {
    #[serde(default)]
    activity_type: Option<WireActivityType>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WireActivityType {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSignaled {
    #[serde(default)]
    signal_name: String,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUpdateAccepted {
    #[serde(default)]
    accepted_request: Option<WireUpdateRequest>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUpdateRequest {
    #[serde(default)]
    input: Option<WireUpdateInput>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUpdateInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WireResult {
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFailed {
    #[serde(default)]
    failure: Option<WireFailure>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFailure {
    #[serde(default)]
    message: String,
    #[serde(default)]
    stack_trace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTimerStarted {
    #[serde(default)]
    timer_id: String,
    #[serde(default)]
    start_to_fire_timeout: Option<String>,
}

impl From<WireFailure> for Failure {
    fn from(wire: WireFailure) -> Self {
        Failure::new(wire.message).with_stack_trace(wire.stack_trace)
    }
}

impl WireEvent {
    /// Convert into the domain event. Attributes for tags the normalizer does
    /// not read are dropped here. Malformed payloads and durations degrade to
    /// shorthand values or absent fields; they never fail the event.
    pub(crate) fn into_event(self) -> HistoryEvent {
        let event_type = match &self.event_type {
            Some(Value::String(name)) => EventType::from_wire_name(name),
            Some(Value::Number(code)) => code.as_i64().map_or(EventType::Unspecified, EventType::from_code),
            _ => EventType::Unspecified,
        };

        let attributes = match event_type {
            EventType::WorkflowExecutionStarted => self
                .workflow_execution_started_event_attributes
                .map(|a| {
                    EventAttributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
                        input: optional_payloads(a.input),
                        original_execution_run_id: a.original_execution_run_id,
                    })
                }),
            EventType::ActivityTaskScheduled => self
                .activity_task_scheduled_event_attributes
                .map(|a| {
                    EventAttributes::ActivityTaskScheduled(ActivityTaskScheduledAttributes {
                        activity_type: a.activity_type.map(|t| t.name),
                        input: optional_payloads(a.input),
                    })
                }),
            EventType::WorkflowExecutionSignaled => self
                .workflow_execution_signaled_event_attributes
                .map(|a| {
                    EventAttributes::WorkflowExecutionSignaled(WorkflowExecutionSignaledAttributes {
                        signal_name: a.signal_name,
                        input: optional_payloads(a.input),
                    })
                }),
            EventType::WorkflowExecutionUpdateAccepted => self
                .workflow_execution_update_accepted_event_attributes
                .map(|a| {
                    let accepted_request = a.accepted_request.map(|request| UpdateRequest {
                        input: request.input.map(|input| UpdateInput {
                            name: input.name,
                            args: optional_payloads(input.args),
                        }),
                    });
                    EventAttributes::WorkflowExecutionUpdateAccepted(
                        WorkflowExecutionUpdateAcceptedAttributes { accepted_request },
                    )
                }),
            EventType::ActivityTaskCompleted => self
                .activity_task_completed_event_attributes
                .map(|a| EventAttributes::ActivityTaskCompleted {
                    result: optional_payloads(a.result),
                }),
            EventType::ActivityTaskFailed => self
                .activity_task_failed_event_attributes
                .map(|a| EventAttributes::ActivityTaskFailed {
                    failure: a.failure.map(Failure::from),
                }),
            EventType::WorkflowExecutionCompleted => self
                .workflow_execution_completed_event_attributes
                .map(|a| EventAttributes::WorkflowExecutionCompleted {
                    result: optional_payloads(a.result),
                }),
            EventType::WorkflowExecutionFailed => self
                .workflow_execution_failed_event_attributes
                .map(|a| EventAttributes::WorkflowExecutionFailed {
                    failure: a.failure.map(Failure::from),
                }),
            EventType::TimerStarted => self.timer_started_event_attributes.map(|a| {
                EventAttributes::TimerStarted(TimerStartedAttributes {
                    timer_id: a.timer_id,
                    start_to_fire_timeout: a
                        .start_to_fire_timeout
                        .as_deref()
                        .and_then(parse_duration),
                })
            }),
            EventType::WorkflowTaskFailed => self
                .workflow_task_failed_event_attributes
                .map(|a| EventAttributes::WorkflowTaskFailed {
                    failure: a.failure.map(Failure::from),
                }),
            _ => None,
        };

        HistoryEvent {
            event_id: self.event_id,
            event_time: self.event_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            event_type,
            attributes,
        }
    }
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("int64 out of range: {n}"))),
        Value::String(s) => s.parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected int64, got {other}"))),
    }
}

fn optional_payloads(value: Option<Value>) -> Option<Payloads> {
    match value {
        None | Some(Value::Null) => None,
        Some(value) => Some(decode_payloads(value)),
    }
}

/// Decode a `Payloads` message: `{"payloads": [...]}`, or in shorthand a bare
/// array of values. Any other value is taken as a single shorthand payload.
fn decode_payloads(value: Value) -> Payloads {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(mut map) if map.len() == 1 && map.contains_key("payloads") => {
            match map.remove("payloads") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![other],
            }
        }
        other => vec![other],
    };
    items.into_iter().map(decode_payload).collect::<Vec<_>>().into()
}

/// Decode one payload. An object is read as a full `Payload` message only
/// when it has the message's shape and its bytes are valid base64; anything
/// else is the shorthand form, the plain JSON value itself.
fn decode_payload(value: Value) -> Payload {
    value
        .as_object()
        .and_then(full_payload)
        .unwrap_or_else(|| Payload::json(&value))
}

fn full_payload(map: &serde_json::Map<String, Value>) -> Option<Payload> {
    let shaped = map
        .keys()
        .all(|k| matches!(k.as_str(), "metadata" | "data" | "externalPayloads"));
    if !shaped {
        return None;
    }
    let Some(Value::String(encoded)) = map.get("data") else {
        return None;
    };
    let data = BASE64.decode(encoded).ok()?;

    let mut metadata = BTreeMap::new();
    match map.get("metadata") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (key, encoded) in entries {
                let bytes = encoded.as_str().and_then(|e| BASE64.decode(e).ok())?;
                metadata.insert(key.clone(), bytes);
            }
        }
        Some(_) => return None,
    }
    Some(Payload { metadata, data })
}

/// Parse a proto-JSON duration such as `"10s"` or `"0.000000500s"`.
pub(crate) fn parse_duration(text: &str) -> Option<Duration> {
    let digits = text.strip_suffix('s')?;
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || fraction.len() > 9 {
        return None;
    }
    let secs: u64 = whole.parse().ok()?;
    let nanos = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse::<u32>().ok()?
    };
    Some(Duration::new(secs, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> HistoryEvent {
        serde_json::from_value::<WireEvent>(value)
            .unwrap()
            .into_event()
    }

    #[test]
    fn test_decodes_started_event_with_string_ids() {
        let event = decode(json!({
            "eventId": "1",
            "eventTime": "2025-03-01T12:00:00Z",
            "eventType": "EVENT_TYPE_WORKFLOW_EXECUTION_STARTED",
            "workflowExecutionStartedEventAttributes": {
                "input": {"payloads": [{
                    "metadata": {"encoding": "anNvbi9wbGFpbg=="},
                    "data": "eyJhIjoxfQ=="
                }]},
                "originalExecutionRunId": "r-orig"
            }
        }));

        assert_eq!(event.event_id, 1);
        assert_eq!(event.event_type, EventType::WorkflowExecutionStarted);
        assert_eq!(event.event_time.to_rfc3339(), "2025-03-01T12:00:00+00:00");
        assert_eq!(event.original_execution_run_id(), Some("r-orig"));
        let Some(EventAttributes::WorkflowExecutionStarted(attrs)) = event.attributes else {
            panic!("expected started attributes");
        };
        let payload = &attrs.input.unwrap().payloads[0];
        assert_eq!(payload.data, br#"{"a":1}"#);
        assert_eq!(payload.metadata["encoding"], b"json/plain");
    }

    #[test]
    fn test_numeric_event_type_and_missing_time() {
        let event = decode(json!({"eventId": 5, "eventType": 18}));
        assert_eq!(event.event_type, EventType::TimerFired);
        assert_eq!(event.event_time, DateTime::<Utc>::UNIX_EPOCH);
        assert!(event.attributes.is_none());
    }

    #[test]
    fn test_shorthand_payloads() {
        let event = decode(json!({
            "eventId": "3",
            "eventType": "EVENT_TYPE_ACTIVITY_TASK_COMPLETED",
            "activityTaskCompletedEventAttributes": {"result": [{"ok": true}, "done"]}
        }));
        let Some(EventAttributes::ActivityTaskCompleted { result }) = event.attributes else {
            panic!("expected completed attributes");
        };
        let payloads = result.unwrap().payloads;
        assert_eq!(payloads[0].data, br#"{"ok":true}"#);
        assert_eq!(payloads[1].data, br#""done""#);
    }

    #[test]
    fn test_failure_and_timer_attributes() {
        let failed = decode(json!({
            "eventId": "9",
            "eventType": "EVENT_TYPE_WORKFLOW_TASK_FAILED",
            "workflowTaskFailedEventAttributes": {
                "failure": {"message": "panic", "stackTrace": "at main"}
            }
        }));
        assert_eq!(
            failed.attributes,
            Some(EventAttributes::WorkflowTaskFailed {
                failure: Some(Failure::new("panic").with_stack_trace("at main")),
            })
        );

        let timer = decode(json!({
            "eventId": "4",
            "eventType": "EVENT_TYPE_TIMER_STARTED",
            "timerStartedEventAttributes": {"timerId": "t1", "startToFireTimeout": "1.5s"}
        }));
        let Some(EventAttributes::TimerStarted(attrs)) = timer.attributes else {
            panic!("expected timer attributes");
        };
        assert_eq!(attrs.start_to_fire_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("0.000000500s"), Some(Duration::from_nanos(500)));
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("1.0000000001s"), None);
    }

    #[test]
    fn test_data_object_that_is_not_base64_is_shorthand() {
        let event = decode(json!({
            "eventId": "1",
            "eventType": "EVENT_TYPE_ACTIVITY_TASK_COMPLETED",
            "activityTaskCompletedEventAttributes": {
                "result": {"payloads": [{"data": "hello world"}, {"data": "%%%", "metadata": {}}]}
            }
        }));
        let Some(EventAttributes::ActivityTaskCompleted { result }) = event.attributes else {
            panic!("expected completed attributes");
        };
        let payloads = result.unwrap().payloads;
        assert_eq!(payloads[0].data, br#"{"data":"hello world"}"#);
        assert_eq!(payloads[1].data, br#"{"data":"%%%","metadata":{}}"#);
    }

    #[test]
    fn test_bad_metadata_falls_back_to_shorthand() {
        let payload = decode_payload(json!({"data": "eyJhIjoxfQ==", "metadata": {"encoding": 7}}));
        assert_eq!(payload.data, br#"{"data":"eyJhIjoxfQ==","metadata":{"encoding":7}}"#);
    }

    #[test]
    fn test_unparseable_timeout_left_unset() {
        let timer = decode(json!({
            "eventId": "4",
            "eventType": "EVENT_TYPE_TIMER_STARTED",
            "timerStartedEventAttributes": {"timerId": "t1", "startToFireTimeout": "-1s"}
        }));
        let Some(EventAttributes::TimerStarted(attrs)) = timer.attributes else {
            panic!("expected timer attributes");
        };
        assert_eq!(attrs.timer_id, "t1");
        assert_eq!(attrs.start_to_fire_timeout, None);
    }
}
