//! Orchestration backend collaborators.
//!
//! The history service needs exactly two things from a backend: the list of
//! open executions, and a lazy cursor over one execution's history. Backends
//! implement [`WorkflowBackend`]; the cursor they hand out is request-local and
//! never shared.

pub mod temporal;
mod wire;

pub use temporal::TemporalHttpBackend;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::HistoryEvent;

/// Failures talking to the orchestration backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("malformed backend response: {0}")]
    Decode(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Identifies one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionRef {
    pub workflow_id: String,
    pub run_id: String,
}

impl ExecutionRef {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// Which events a history read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFilter {
    /// Every event in the history.
    #[default]
    AllEvents,
}

impl HistoryFilter {
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::AllEvents => "HISTORY_EVENT_FILTER_TYPE_ALL_EVENT",
        }
    }
}

/// Forward-only, single-pass cursor over one execution's history.
///
/// Pages are fetched on demand. `Ok(None)` means the history is exhausted.
#[async_trait]
pub trait HistoryCursor: Send {
    async fn next_event(&mut self) -> Result<Option<HistoryEvent>, BackendError>;
}

/// Read-only view of a workflow-orchestration backend.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// List executions that have not reached a terminal state, in backend order.
    async fn list_open_executions(&self) -> Result<Vec<ExecutionRef>, BackendError>;

    /// Open a lazy cursor over an execution's history. An empty `run_id`
    /// selects the latest run.
    async fn get_history(
        &self,
        workflow_id: &str,
        run_id: &str,
        long_poll: bool,
        filter: HistoryFilter,
    ) -> Result<Box<dyn HistoryCursor>, BackendError>;
}

#[async_trait]
impl<T: WorkflowBackend + ?Sized> WorkflowBackend for Arc<T> {
    async fn list_open_executions(&self) -> Result<Vec<ExecutionRef>, BackendError> {
        (**self).list_open_executions().await
    }

    async fn get_history(
        &self,
        workflow_id: &str,
        run_id: &str,
        long_poll: bool,
        filter: HistoryFilter,
    ) -> Result<Box<dyn HistoryCursor>, BackendError> {
        (**self)
            .get_history(workflow_id, run_id, long_poll, filter)
            .await
    }
}

/// A recorded `get_history` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub workflow_id: String,
    pub run_id: String,
    pub long_poll: bool,
    pub filter: HistoryFilter,
}

#[derive(Debug, Clone)]
struct ScriptedHistory {
    execution: ExecutionRef,
    events: Vec<HistoryEvent>,
    /// Pull index at which the cursor fails, and the message.
    fail_at: Option<(usize, String)>,
    open_error: Option<String>,
}

/// In-memory backend with scripted histories and failures.
///
/// Used by the test suites and for running the server without a cluster.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    open: Vec<ExecutionRef>,
    histories: Vec<ScriptedHistory>,
    list_error: Option<String>,
    requests: Mutex<Vec<HistoryRequest>>,
}

impl InMemoryBackend {
    /// Create an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the history of one run.
    #[must_use]
    pub fn with_history(
        mut self,
        workflow_id: &str,
        run_id: &str,
        events: Vec<HistoryEvent>,
    ) -> Self {
        self.histories.push(ScriptedHistory {
            execution: ExecutionRef::new(workflow_id, run_id),
            events,
            fail_at: None,
            open_error: None,
        });
        self
    }

    /// Register a run and list it as open.
    #[must_use]
    pub fn with_open_execution(
        mut self,
        workflow_id: &str,
        run_id: &str,
        events: Vec<HistoryEvent>,
    ) -> Self {
        self.open.push(ExecutionRef::new(workflow_id, run_id));
        self.with_history(workflow_id, run_id, events)
    }

    /// Make the cursor of a registered run fail on its `index`-th pull.
    #[must_use]
    pub fn failing_at(mut self, workflow_id: &str, run_id: &str, index: usize, message: &str) -> Self {
        if let Some(history) = self.find_mut(workflow_id, run_id) {
            history.fail_at = Some((index, message.to_string()));
        }
        self
    }

    /// Make opening the cursor of a registered run fail.
    #[must_use]
    pub fn failing_open(mut self, workflow_id: &str, run_id: &str, message: &str) -> Self {
        if let Some(history) = self.find_mut(workflow_id, run_id) {
            history.open_error = Some(message.to_string());
        }
        self
    }

    /// Make listing open executions fail.
    #[must_use]
    pub fn failing_list(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    /// Every `get_history` call made so far.
    pub fn history_requests(&self) -> Vec<HistoryRequest> {
        self.requests.lock().clone()
    }

    fn find_mut(&mut self, workflow_id: &str, run_id: &str) -> Option<&mut ScriptedHistory> {
        self.histories
            .iter_mut()
            .find(|h| h.execution.workflow_id == workflow_id && h.execution.run_id == run_id)
    }

    fn find(&self, workflow_id: &str, run_id: &str) -> Option<&ScriptedHistory> {
        if run_id.is_empty() {
            return self
                .histories
                .iter()
                .rev()
                .find(|h| h.execution.workflow_id == workflow_id);
        }
        self.histories
            .iter()
            .find(|h| h.execution.workflow_id == workflow_id && h.execution.run_id == run_id)
    }
}

#[async_trait]
impl WorkflowBackend for InMemoryBackend {
    async fn list_open_executions(&self) -> Result<Vec<ExecutionRef>, BackendError> {
        match &self.list_error {
            Some(message) => Err(BackendError::Unavailable(message.clone())),
            None => Ok(self.open.clone()),
        }
    }

    async fn get_history(
        &self,
        workflow_id: &str,
        run_id: &str,
        long_poll: bool,
        filter: HistoryFilter,
    ) -> Result<Box<dyn HistoryCursor>, BackendError> {
        self.requests.lock().push(HistoryRequest {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            long_poll,
            filter,
        });

        let Some(history) = self.find(workflow_id, run_id) else {
            // Mirror the HTTP backend: the first page fetch reports the miss.
            return Ok(Box::new(VecCursor {
                events: Vec::new().into_iter(),
                pulled: 0,
                fail_at: Some((0, format!("workflow execution not found: {workflow_id}"))),
            }));
        };
        if let Some(message) = &history.open_error {
            return Err(BackendError::Unavailable(message.clone()));
        }

        Ok(Box::new(VecCursor {
            events: history.events.clone().into_iter(),
            pulled: 0,
            fail_at: history.fail_at.clone(),
        }))
    }
}

#[derive(Debug)]
struct VecCursor {
    events: std::vec::IntoIter<HistoryEvent>,
    pulled: usize,
    fail_at: Option<(usize, String)>,
}

#[async_trait]
impl HistoryCursor for VecCursor {
    async fn next_event(&mut self) -> Result<Option<HistoryEvent>, BackendError> {
        if let Some((index, message)) = &self.fail_at {
            if *index == self.pulled {
                return Err(BackendError::Unavailable(message.clone()));
            }
        }
        self.pulled += 1;
        Ok(self.events.next())
    }
}
