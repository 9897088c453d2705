//! Event normalizer.
//!
//! Reduces one raw [`HistoryEvent`] to a compact, JSON-safe
//! [`NormalizedEvent`], or drops it. Which event types survive, and which
//! fields each one contributes, is decided by a single allow-list table
//! ([`EXTRACTORS`]); every type missing from it is dropped.
//!
//! Payload bytes never reach the output: each part is decoded as JSON, or
//! kept as its literal string when it is not valid JSON.

use std::time::Duration;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::history::{EventAttributes, EventType, Failure, HistoryEvent, Payloads};

/// Detail key carrying a failure message.
pub const ERROR_KEY: &str = "error";

/// Free-form per-event details.
pub type Details = Map<String, Value>;

/// A history event reduced to the fields worth showing a reader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event_id: i64,
    /// Canonical event type name, e.g. `ActivityTaskFailed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 UTC, second precision.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Details,
}

impl NormalizedEvent {
    /// The extracted failure message, if this event signals one.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.details.get(ERROR_KEY).and_then(Value::as_str)
    }
}

/// Field extraction for one event type.
type Extractor = fn(Option<&EventAttributes>, &mut Details);

/// Allow-list of kept event types and how each one is reduced.
const EXTRACTORS: &[(EventType, Extractor)] = &[
    (EventType::WorkflowExecutionStarted, extract_workflow_started),
    (EventType::ActivityTaskScheduled, extract_activity_scheduled),
    (EventType::WorkflowExecutionSignaled, extract_workflow_signaled),
    (EventType::WorkflowExecutionUpdateAccepted, extract_update_accepted),
    (EventType::ActivityTaskCompleted, extract_activity_completed),
    (EventType::ActivityTaskFailed, extract_activity_failed),
    (EventType::WorkflowExecutionCompleted, extract_workflow_completed),
    (EventType::WorkflowExecutionFailed, extract_workflow_failed),
    (EventType::TimerStarted, extract_timer_started),
    (EventType::WorkflowTaskFailed, extract_workflow_task_failed),
];

fn extractor_for(event_type: EventType) -> Option<Extractor> {
    EXTRACTORS
        .iter()
        .find(|(t, _)| *t == event_type)
        .map(|(_, extract)| *extract)
}

/// Whether events of this type survive normalization.
#[must_use]
pub fn is_kept(event_type: EventType) -> bool {
    extractor_for(event_type).is_some()
}

/// Event types that survive normalization, in table order.
pub fn kept_event_types() -> impl Iterator<Item = EventType> {
    EXTRACTORS.iter().map(|(t, _)| *t)
}

/// Normalize one raw event. `None` means the event is dropped.
///
/// `_summary_only` is accepted for callers that distinguish the failure
/// scan from a full history read; both currently share one allow-list.
#[must_use]
pub fn normalize(event: &HistoryEvent, _summary_only: bool) -> Option<NormalizedEvent> {
    let extract = extractor_for(event.event_type)?;

    let mut details = Details::new();
    extract(event.attributes.as_ref(), &mut details);

    Some(NormalizedEvent {
        event_id: event.event_id,
        event_type: event.event_type.name().to_string(),
        timestamp: event.event_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        details,
    })
}

/// Decode bytes as JSON, falling back to their literal string form.
#[must_use]
pub fn decode_or_fallback(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Store every payload part under `input_part_{i}`.
pub fn extract_payloads(payloads: Option<&Payloads>, details: &mut Details) {
    let Some(payloads) = payloads else {
        return;
    };
    for (i, part) in payloads.payloads.iter().enumerate() {
        details.insert(format!("input_part_{i}"), decode_or_fallback(&part.data));
    }
}

fn insert_failure(failure: Option<&Failure>, details: &mut Details) {
    if let Some(failure) = failure {
        details.insert(ERROR_KEY.to_string(), Value::String(failure.message.clone()));
    }
}

fn extract_workflow_started(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::WorkflowExecutionStarted(attrs)) = attrs {
        extract_payloads(attrs.input.as_ref(), details);
    }
}

fn extract_activity_scheduled(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::ActivityTaskScheduled(attrs)) = attrs {
        details.insert(
            "activity_type".to_string(),
            Value::String(attrs.activity_type.clone().unwrap_or_default()),
        );
        extract_payloads(attrs.input.as_ref(), details);
    }
}

fn extract_workflow_signaled(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::WorkflowExecutionSignaled(attrs)) = attrs {
        details.insert(
            "signal_name".to_string(),
            Value::String(attrs.signal_name.clone()),
        );
        extract_payloads(attrs.input.as_ref(), details);
    }
}

fn extract_update_accepted(attrs: Option<&EventAttributes>, details: &mut Details) {
    let Some(EventAttributes::WorkflowExecutionUpdateAccepted(attrs)) = attrs else {
        return;
    };
    let Some(input) = attrs
        .accepted_request
        .as_ref()
        .and_then(|request| request.input.as_ref())
    else {
        return;
    };
    if !input.name.is_empty() {
        details.insert("update_name".to_string(), Value::String(input.name.clone()));
    }
    extract_payloads(input.args.as_ref(), details);
}

fn extract_activity_completed(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::ActivityTaskCompleted { result }) = attrs {
        extract_payloads(result.as_ref(), details);
    }
}

fn extract_activity_failed(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::ActivityTaskFailed { failure }) = attrs {
        insert_failure(failure.as_ref(), details);
    }
}

fn extract_workflow_completed(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::WorkflowExecutionCompleted { result }) = attrs {
        extract_payloads(result.as_ref(), details);
    }
}

fn extract_workflow_failed(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::WorkflowExecutionFailed { failure }) = attrs {
        insert_failure(failure.as_ref(), details);
    }
}

fn extract_timer_started(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::TimerStarted(attrs)) = attrs {
        details.insert("timer_id".to_string(), Value::String(attrs.timer_id.clone()));
        details.insert(
            "timeout".to_string(),
            Value::String(format_duration(attrs.start_to_fire_timeout.unwrap_or_default())),
        );
    }
}

fn extract_workflow_task_failed(attrs: Option<&EventAttributes>, details: &mut Details) {
    if let Some(EventAttributes::WorkflowTaskFailed {
        failure: Some(failure),
    }) = attrs
    {
        details.insert(
            ERROR_KEY.to_string(),
            Value::String(format!("{}\n{}", failure.message, failure.stack_trace)),
        );
    }
}

/// Render a duration the way Go's `time.Duration` prints: `10s`, `1m30s`,
/// `1h0m0s`, `1.5s`, `250ms`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000));
    }

    let secs = duration.as_secs();
    let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
    let seconds = decimal(
        u128::from(secs % 60) * 1_000_000_000 + u128::from(duration.subsec_nanos()),
        1_000_000_000,
    );

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `value / unit` with the fraction's trailing zeros trimmed.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let remainder = value % unit;
    if remainder == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let fraction = format!("{remainder:0width$}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}
