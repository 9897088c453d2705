//! Failure scan over open executions.
//!
//! Lists every open execution, drains each history in summary-only mode and
//! reports the executions whose kept events carry an error. One execution's
//! backend trouble never fails the scan; only the listing itself can.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::{DrainError, Drained, drain};
use crate::backend::{ExecutionRef, HistoryFilter, WorkflowBackend};
use crate::error::{HistoryError, ServiceResult};
use crate::normalize::NormalizedEvent;

/// One open execution whose history carries an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedWorkflowEntry {
    pub workflow_id: String,
    pub run_id: String,
    /// Error of the last error-bearing event in the history.
    pub error: String,
    /// Every kept event, in history order.
    pub summary: Vec<NormalizedEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedWorkflowsResult {
    pub workflows: Vec<FailedWorkflowEntry>,
}

/// Scans open executions for failures.
#[derive(Clone)]
pub struct FailureScanner {
    backend: Arc<dyn WorkflowBackend>,
    concurrency: usize,
}

impl fmt::Debug for FailureScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureScanner")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl FailureScanner {
    pub fn new(backend: Arc<dyn WorkflowBackend>) -> Self {
        Self {
            backend,
            concurrency: 1,
        }
    }

    /// Number of executions drained at once. Output order is unaffected.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Report every open execution with an error in its history, in listing
    /// order. Healthy executions are omitted.
    pub async fn scan_failed(
        &self,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<FailedWorkflowEntry>> {
        let executions = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HistoryError::Cancelled),
            listed = self.backend.list_open_executions() => {
                listed.map_err(HistoryError::BackendUnavailable)?
            }
        };
        debug!(count = executions.len(), "Scanning open executions");

        let outcomes: Vec<ServiceResult<Option<FailedWorkflowEntry>>> =
            stream::iter(executions)
                .map(|execution| self.scan_execution(execution, cancel))
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut failed = Vec::new();
        for outcome in outcomes {
            if let Some(entry) = outcome? {
                failed.push(entry);
            }
        }

        info!(failed = failed.len(), "Failure scan finished");
        Ok(failed)
    }

    async fn scan_execution(
        &self,
        execution: ExecutionRef,
        cancel: &CancellationToken,
    ) -> ServiceResult<Option<FailedWorkflowEntry>> {
        let mut cursor = match self
            .backend
            .get_history(
                &execution.workflow_id,
                &execution.run_id,
                false,
                HistoryFilter::AllEvents,
            )
            .await
        {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(
                    workflow_id = %execution.workflow_id,
                    run_id = %execution.run_id,
                    error = %e,
                    "Skipping execution: history unavailable"
                );
                return Ok(None);
            }
        };

        let mut drained = Drained::default();
        match drain(cursor.as_mut(), true, cancel, &mut drained).await {
            Ok(()) => {}
            Err(DrainError::Cancelled) => return Err(HistoryError::Cancelled),
            Err(DrainError::Backend(e)) => warn!(
                workflow_id = %execution.workflow_id,
                run_id = %execution.run_id,
                read = drained.total,
                error = %e,
                "History read stopped early"
            ),
        }

        Ok(last_error(&drained.events).map(|error| FailedWorkflowEntry {
            workflow_id: execution.workflow_id,
            run_id: execution.run_id,
            error,
            summary: drained.events,
        }))
    }
}

/// The error of the last error-bearing event, if it is non-empty. An empty
/// message still overwrites an earlier one.
fn last_error(events: &[NormalizedEvent]) -> Option<String> {
    events
        .iter()
        .rev()
        .find_map(NormalizedEvent::error)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn event(id: i64, error: Option<&str>) -> NormalizedEvent {
        let mut event = NormalizedEvent {
            event_id: id,
            event_type: "ActivityTaskFailed".to_string(),
            ..Default::default()
        };
        if let Some(message) = error {
            event
                .details
                .insert("error".to_string(), Value::String(message.to_string()));
        }
        event
    }

    #[test]
    fn test_last_error_wins() {
        let events = vec![event(1, Some("E1")), event(2, None), event(3, Some("E2"))];
        assert_eq!(last_error(&events).as_deref(), Some("E2"));
    }

    #[test]
    fn test_trailing_empty_message_clears_error() {
        let events = vec![event(1, Some("E1")), event(2, Some(""))];
        assert_eq!(last_error(&events), None);

        let events = vec![event(1, Some("")), event(2, None), event(3, Some("E2"))];
        assert_eq!(last_error(&events).as_deref(), Some("E2"));
        assert_eq!(last_error(&[event(1, None)]), None);
    }

    #[test]
    fn test_entry_serialization_keys() {
        let entry = FailedWorkflowEntry {
            workflow_id: "wf".to_string(),
            run_id: "run".to_string(),
            error: "boom".to_string(),
            summary: vec![event(1, Some("boom"))],
        };
        let json = serde_json::to_value(FailedWorkflowsResult {
            workflows: vec![entry],
        })
        .unwrap();
        assert_eq!(json["workflows"][0]["error"], "boom");
        assert_eq!(json["workflows"][0]["summary"][0]["type"], "ActivityTaskFailed");
    }
}
