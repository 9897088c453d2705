//! History aggregation.
//!
//! Streams one execution's history through the normalizer and builds the
//! [`HistoryResult`] the `workflow_history` tool returns. Raw events are never
//! buffered; only the kept sequence, the raw count and the first event's run
//! id hint survive the drain.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::backend::{BackendError, HistoryCursor, HistoryFilter, WorkflowBackend};
use crate::error::{HistoryError, ServiceResult};
use crate::normalize::{NormalizedEvent, normalize};

/// Normalized view of one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResult {
    pub workflow_id: String,
    pub run_id: String,
    pub summary: String,
    #[serde(
        rename = "instructionsForReadingEvents",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub instructions: Option<String>,
    pub events: Vec<NormalizedEvent>,
}

/// `"Workflow has {total} events. We are examining {kept} events."`
#[must_use]
pub fn summarize(total: usize, kept: usize) -> String {
    format!("Workflow has {total} events. We are examining {kept} events.")
}

/// What a drain collected, possibly partially.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    /// Raw events pulled, kept or not.
    pub total: usize,
    pub events: Vec<NormalizedEvent>,
    /// Original run id carried by a leading workflow-started event.
    pub original_run_id: Option<String>,
}

#[derive(Debug)]
pub(crate) enum DrainError {
    Cancelled,
    Backend(BackendError),
}

/// Pull `cursor` to exhaustion into `drained`, checking `cancel` between pulls.
pub(crate) async fn drain(
    cursor: &mut dyn HistoryCursor,
    summary_only: bool,
    cancel: &CancellationToken,
    drained: &mut Drained,
) -> Result<(), DrainError> {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DrainError::Cancelled),
            next = cursor.next_event() => next,
        };

        let Some(event) = next.map_err(DrainError::Backend)? else {
            return Ok(());
        };

        if drained.total == 0 {
            drained.original_run_id = event.original_execution_run_id().map(str::to_string);
        }
        drained.total += 1;

        if let Some(normalized) = normalize(&event, summary_only) {
            drained.events.push(normalized);
        }
    }
}

/// Builds [`HistoryResult`]s from a backend.
#[derive(Clone)]
pub struct HistoryAggregator {
    backend: Arc<dyn WorkflowBackend>,
}

impl fmt::Debug for HistoryAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryAggregator").finish_non_exhaustive()
    }
}

impl HistoryAggregator {
    pub fn new(backend: Arc<dyn WorkflowBackend>) -> Self {
        Self { backend }
    }

    /// Read and normalize the full history of `workflow_id`.
    ///
    /// `run_id` of `None` (or empty) selects the latest run. If the history
    /// opens with a workflow-started event, that event's original run id is
    /// reported instead of the requested one.
    ///
    /// Any cursor failure aborts the read with [`HistoryError::HistoryRead`];
    /// no partial result is returned.
    #[instrument(skip(self, cancel))]
    pub async fn get_history(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> ServiceResult<HistoryResult> {
        let requested_run_id = run_id.unwrap_or_default();

        let mut cursor = self
            .backend
            .get_history(workflow_id, requested_run_id, false, HistoryFilter::AllEvents)
            .await
            .map_err(HistoryError::BackendUnavailable)?;

        let mut drained = Drained::default();
        drain(cursor.as_mut(), false, cancel, &mut drained)
            .await
            .map_err(|e| match e {
                DrainError::Cancelled => HistoryError::Cancelled,
                DrainError::Backend(source) => HistoryError::HistoryRead(source),
            })?;

        debug!(
            total = drained.total,
            kept = drained.events.len(),
            "Read workflow history"
        );

        Ok(HistoryResult {
            workflow_id: workflow_id.to_string(),
            run_id: drained
                .original_run_id
                .unwrap_or_else(|| requested_run_id.to_string()),
            summary: summarize(drained.total, drained.events.len()),
            instructions: None,
            events: drained.events,
        })
    }
}
