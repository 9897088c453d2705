//! Raw execution-history model.
//!
//! These types mirror the subset of Temporal's `history.v1` messages the
//! normalizer reads. Backend adapters decode their wire format into
//! [`HistoryEvent`]; nothing downstream sees the wire shape.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

macro_rules! event_types {
    ($($variant:ident = $code:literal => $wire:literal,)+) => {
        /// Type tag of a history event.
        ///
        /// Covers the full `EVENT_TYPE_*` enumeration. Values the adapter does
        /// not recognize decode to [`EventType::Unspecified`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum EventType {
            #[default]
            Unspecified,
            $($variant,)+
        }

        impl EventType {
            /// Every concrete tag, in enumeration order.
            pub const ALL: &'static [EventType] = &[$(EventType::$variant,)+];

            /// Canonical human-readable name, e.g. `WorkflowExecutionStarted`.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    Self::Unspecified => "Unspecified",
                    $(Self::$variant => stringify!($variant),)+
                }
            }

            /// Proto enum value name, e.g. `EVENT_TYPE_WORKFLOW_EXECUTION_STARTED`.
            #[must_use]
            pub fn wire_name(self) -> &'static str {
                match self {
                    Self::Unspecified => "EVENT_TYPE_UNSPECIFIED",
                    $(Self::$variant => $wire,)+
                }
            }

            /// Numeric proto value.
            #[must_use]
            pub fn code(self) -> i64 {
                match self {
                    Self::Unspecified => 0,
                    $(Self::$variant => $code,)+
                }
            }

            /// Resolve a numeric proto value.
            #[must_use]
            pub fn from_code(code: i64) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    _ => Self::Unspecified,
                }
            }
        }
    };
}

event_types! {
    WorkflowExecutionStarted = 1 => "EVENT_TYPE_WORKFLOW_EXECUTION_STARTED",
    WorkflowExecutionCompleted = 2 => "EVENT_TYPE_WORKFLOW_EXECUTION_COMPLETED",
    WorkflowExecutionFailed = 3 => "EVENT_TYPE_WORKFLOW_EXECUTION_FAILED",
    WorkflowExecutionTimedOut = 4 => "EVENT_TYPE_WORKFLOW_EXECUTION_TIMED_OUT",
    WorkflowTaskScheduled = 5 => "EVENT_TYPE_WORKFLOW_TASK_SCHEDULED",
    WorkflowTaskStarted = 6 => "EVENT_TYPE_WORKFLOW_TASK_STARTED",
    WorkflowTaskCompleted = 7 => "EVENT_TYPE_WORKFLOW_TASK_COMPLETED",
    WorkflowTaskTimedOut = 8 => "EVENT_TYPE_WORKFLOW_TASK_TIMED_OUT",
    WorkflowTaskFailed = 9 => "EVENT_TYPE_WORKFLOW_TASK_FAILED",
    ActivityTaskScheduled = 10 => "EVENT_TYPE_ACTIVITY_TASK_SCHEDULED",
    ActivityTaskStarted = 11 => "EVENT_TYPE_ACTIVITY_TASK_STARTED",
    ActivityTaskCompleted = 12 => "EVENT_TYPE_ACTIVITY_TASK_COMPLETED",
    ActivityTaskFailed = 13 => "EVENT_TYPE_ACTIVITY_TASK_FAILED",
    ActivityTaskTimedOut = 14 => "EVENT_TYPE_ACTIVITY_TASK_TIMED_OUT",
    ActivityTaskCancelRequested = 15 => "EVENT_TYPE_ACTIVITY_TASK_CANCEL_REQUESTED",
    ActivityTaskCanceled = 16 => "EVENT_TYPE_ACTIVITY_TASK_CANCELED",
    TimerStarted = 17 => "EVENT_TYPE_TIMER_STARTED",
    TimerFired = 18 => "EVENT_TYPE_TIMER_FIRED",
    TimerCanceled = 19 => "EVENT_TYPE_TIMER_CANCELED",
    WorkflowExecutionCancelRequested = 20 => "EVENT_TYPE_WORKFLOW_EXECUTION_CANCEL_REQUESTED",
    WorkflowExecutionCanceled = 21 => "EVENT_TYPE_WORKFLOW_EXECUTION_CANCELED",
    RequestCancelExternalWorkflowExecutionInitiated = 22 => "EVENT_TYPE_REQUEST_CANCEL_EXTERNAL_WORKFLOW_EXECUTION_INITIATED",
    RequestCancelExternalWorkflowExecutionFailed = 23 => "EVENT_TYPE_REQUEST_CANCEL_EXTERNAL_WORKFLOW_EXECUTION_FAILED",
    ExternalWorkflowExecutionCancelRequested = 24 => "EVENT_TYPE_EXTERNAL_WORKFLOW_EXECUTION_CANCEL_REQUESTED",
    MarkerRecorded = 25 => "EVENT_TYPE_MARKER_RECORDED",
    WorkflowExecutionSignaled = 26 => "EVENT_TYPE_WORKFLOW_EXECUTION_SIGNALED",
    WorkflowExecutionTerminated = 27 => "EVENT_TYPE_WORKFLOW_EXECUTION_TERMINATED",
    WorkflowExecutionContinuedAsNew = 28 => "EVENT_TYPE_WORKFLOW_EXECUTION_CONTINUED_AS_NEW",
    StartChildWorkflowExecutionInitiated = 29 => "EVENT_TYPE_START_CHILD_WORKFLOW_EXECUTION_INITIATED",
    StartChildWorkflowExecutionFailed = 30 => "EVENT_TYPE_START_CHILD_WORKFLOW_EXECUTION_FAILED",
    ChildWorkflowExecutionStarted = 31 => "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_STARTED",
    ChildWorkflowExecutionCompleted = 32 => "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_COMPLETED",
    ChildWorkflowExecutionFailed = 33 => "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_FAILED",
    ChildWorkflowExecutionCanceled = 34 => "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_CANCELED",
    ChildWorkflowExecutionTimedOut = 35 => "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_TIMED_OUT",
    ChildWorkflowExecutionTerminated = 36 => "EVENT_TYPE_CHILD_WORKFLOW_EXECUTION_TERMINATED",
    SignalExternalWorkflowExecutionInitiated = 37 => "EVENT_TYPE_SIGNAL_EXTERNAL_WORKFLOW_EXECUTION_INITIATED",
    SignalExternalWorkflowExecutionFailed = 38 => "EVENT_TYPE_SIGNAL_EXTERNAL_WORKFLOW_EXECUTION_FAILED",
    ExternalWorkflowExecutionSignaled = 39 => "EVENT_TYPE_EXTERNAL_WORKFLOW_EXECUTION_SIGNALED",
    UpsertWorkflowSearchAttributes = 40 => "EVENT_TYPE_UPSERT_WORKFLOW_SEARCH_ATTRIBUTES",
    WorkflowExecutionUpdateAccepted = 41 => "EVENT_TYPE_WORKFLOW_EXECUTION_UPDATE_ACCEPTED",
    WorkflowExecutionUpdateRejected = 42 => "EVENT_TYPE_WORKFLOW_EXECUTION_UPDATE_REJECTED",
    WorkflowExecutionUpdateCompleted = 43 => "EVENT_TYPE_WORKFLOW_EXECUTION_UPDATE_COMPLETED",
    WorkflowPropertiesModifiedExternally = 44 => "EVENT_TYPE_WORKFLOW_PROPERTIES_MODIFIED_EXTERNALLY",
    ActivityPropertiesModifiedExternally = 45 => "EVENT_TYPE_ACTIVITY_PROPERTIES_MODIFIED_EXTERNALLY",
    WorkflowPropertiesModified = 46 => "EVENT_TYPE_WORKFLOW_PROPERTIES_MODIFIED",
    WorkflowExecutionUpdateAdmitted = 47 => "EVENT_TYPE_WORKFLOW_EXECUTION_UPDATE_ADMITTED",
    NexusOperationScheduled = 48 => "EVENT_TYPE_NEXUS_OPERATION_SCHEDULED",
    NexusOperationStarted = 49 => "EVENT_TYPE_NEXUS_OPERATION_STARTED",
    NexusOperationCompleted = 50 => "EVENT_TYPE_NEXUS_OPERATION_COMPLETED",
    NexusOperationFailed = 51 => "EVENT_TYPE_NEXUS_OPERATION_FAILED",
    NexusOperationCanceled = 52 => "EVENT_TYPE_NEXUS_OPERATION_CANCELED",
    NexusOperationTimedOut = 53 => "EVENT_TYPE_NEXUS_OPERATION_TIMED_OUT",
    NexusOperationCancelRequested = 54 => "EVENT_TYPE_NEXUS_OPERATION_CANCEL_REQUESTED",
    WorkflowExecutionOptionsUpdated = 55 => "EVENT_TYPE_WORKFLOW_EXECUTION_OPTIONS_UPDATED",
    NexusOperationCancelRequestCompleted = 56 => "EVENT_TYPE_NEXUS_OPERATION_CANCEL_REQUEST_COMPLETED",
    NexusOperationCancelRequestFailed = 57 => "EVENT_TYPE_NEXUS_OPERATION_CANCEL_REQUEST_FAILED",
}

impl EventType {
    /// Resolve a wire name. Accepts both `EVENT_TYPE_TIMER_STARTED` and
    /// `TimerStarted`; anything else is [`EventType::Unspecified`].
    #[must_use]
    pub fn from_wire_name(name: &str) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.wire_name() == name || t.name() == name)
            .unwrap_or_default()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One part of an encoded argument or result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub data: Vec<u8>,
}

impl Payload {
    /// Payload carrying raw bytes with no metadata.
    #[must_use]
    pub fn raw(data: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: BTreeMap::new(),
            data: data.into(),
        }
    }

    /// Payload carrying `value` encoded the way the default data converter does.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("encoding".to_string(), b"json/plain".to_vec());
        Self {
            metadata,
            data: value.to_string().into_bytes(),
        }
    }
}

/// Ordered multi-part payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payloads {
    pub payloads: Vec<Payload>,
}

impl From<Vec<Payload>> for Payloads {
    fn from(payloads: Vec<Payload>) -> Self {
        Self { payloads }
    }
}

/// Failure details attached to failed events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub stack_trace: String,
}

impl Failure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: String::new(),
        }
    }

    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = stack_trace.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowExecutionStartedAttributes {
    pub input: Option<Payloads>,
    pub original_execution_run_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityTaskScheduledAttributes {
    /// Declared activity type name.
    pub activity_type: Option<String>,
    pub input: Option<Payloads>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowExecutionSignaledAttributes {
    pub signal_name: String,
    pub input: Option<Payloads>,
}

/// Input of an accepted update request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateInput {
    pub name: String,
    pub args: Option<Payloads>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub input: Option<UpdateInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowExecutionUpdateAcceptedAttributes {
    pub accepted_request: Option<UpdateRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerStartedAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout: Option<Duration>,
}

/// Type-specific attributes of a history event.
///
/// Only the variants the normalizer reads are modeled; adapters leave
/// `attributes` empty for every other event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAttributes {
    WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),
    ActivityTaskScheduled(ActivityTaskScheduledAttributes),
    WorkflowExecutionSignaled(WorkflowExecutionSignaledAttributes),
    WorkflowExecutionUpdateAccepted(WorkflowExecutionUpdateAcceptedAttributes),
    ActivityTaskCompleted { result: Option<Payloads> },
    ActivityTaskFailed { failure: Option<Failure> },
    WorkflowExecutionCompleted { result: Option<Payloads> },
    WorkflowExecutionFailed { failure: Option<Failure> },
    TimerStarted(TimerStartedAttributes),
    WorkflowTaskFailed { failure: Option<Failure> },
}

/// A single raw event from an execution history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    /// Sequence id, strictly increasing within one history.
    pub event_id: i64,
    pub event_time: DateTime<Utc>,
    pub event_type: EventType,
    pub attributes: Option<EventAttributes>,
}

impl HistoryEvent {
    /// Event with no attributes, stamped at the Unix epoch.
    #[must_use]
    pub fn new(event_id: i64, event_type: EventType) -> Self {
        Self {
            event_id,
            event_time: DateTime::<Utc>::UNIX_EPOCH,
            event_type,
            attributes: None,
        }
    }

    #[must_use]
    pub fn at(mut self, event_time: DateTime<Utc>) -> Self {
        self.event_time = event_time;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: EventAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Original execution run id, when this event carries workflow-started
    /// attributes.
    #[must_use]
    pub fn original_execution_run_id(&self) -> Option<&str> {
        match &self.attributes {
            Some(EventAttributes::WorkflowExecutionStarted(attrs)) => {
                Some(attrs.original_execution_run_id.as_str())
            }
            _ => None,
        }
    }
}
