//! Temporal frontend HTTP API backend.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::wire::{GetHistoryResponse, ListExecutionsResponse, WireEvent};
use super::{BackendError, ExecutionRef, HistoryCursor, HistoryFilter, WorkflowBackend};
use crate::config::TemporalConfig;
use crate::history::HistoryEvent;

const OPEN_EXECUTIONS_QUERY: &str = r#"ExecutionStatus="Running""#;

/// Reads workflow histories over Temporal's HTTP API.
#[derive(Debug, Clone)]
pub struct TemporalHttpBackend {
    client: Client,
    base_url: Url,
    namespace: String,
    page_size: u32,
}

impl TemporalHttpBackend {
    pub fn new(client: Client, base_url: Url, namespace: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            namespace: namespace.into(),
            page_size: 0,
        }
    }

    /// Build a backend from configuration. A bare `host:port` address is
    /// treated as plain HTTP.
    pub fn from_config(config: &TemporalConfig) -> Result<Self, BackendError> {
        let base_url = parse_address(&config.address)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| BackendError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;

        Ok(Self::new(client, base_url, config.namespace.clone()).with_page_size(config.page_size))
    }

    /// Maximum events per history page. Zero lets the server decide.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn endpoint(&self, trailing: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| BackendError::InvalidAddress {
                address: self.base_url.to_string(),
                reason: "address cannot be a base URL".to_string(),
            })?;
            segments
                .pop_if_empty()
                .extend(["api", "v1", "namespaces", self.namespace.as_str(), "workflows"])
                .extend(trailing);
        }
        Ok(url)
    }

    fn history_url(
        &self,
        workflow_id: &str,
        run_id: &str,
        long_poll: bool,
        filter: HistoryFilter,
        page_token: Option<&str>,
    ) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&[workflow_id, "history"])?;
        {
            let mut query = url.query_pairs_mut();
            if !run_id.is_empty() {
                query.append_pair("execution.runId", run_id);
            }
            if self.page_size > 0 {
                query.append_pair("maximumPageSize", &self.page_size.to_string());
            }
            if let Some(token) = page_token {
                query.append_pair("nextPageToken", token);
            }
            query
                .append_pair("waitNewEvent", if long_poll { "true" } else { "false" })
                .append_pair("historyEventFilterType", filter.wire_name());
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, BackendError> {
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: url.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: url.to_string(),
                source,
            })?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body);
            warn!(status = status.as_u16(), endpoint = %url.path(), "Backend request failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }

        serde_json::from_slice(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WorkflowBackend for TemporalHttpBackend {
    async fn list_open_executions(&self) -> Result<Vec<ExecutionRef>, BackendError> {
        let mut executions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.endpoint(&[])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("query", OPEN_EXECUTIONS_QUERY);
                if let Some(token) = &page_token {
                    query.append_pair("nextPageToken", token);
                }
            }

            let page: ListExecutionsResponse = self.get_json(url).await?;
            executions.extend(
                page.executions
                    .into_iter()
                    .map(|info| ExecutionRef::new(info.execution.workflow_id, info.execution.run_id)),
            );

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }

        debug!(
            namespace = %self.namespace,
            count = executions.len(),
            "Listed open executions"
        );
        Ok(executions)
    }

    async fn get_history(
        &self,
        workflow_id: &str,
        run_id: &str,
        long_poll: bool,
        filter: HistoryFilter,
    ) -> Result<Box<dyn HistoryCursor>, BackendError> {
        // Validate the address up front so a bad base URL surfaces at open time.
        self.endpoint(&[workflow_id, "history"])?;

        Ok(Box::new(HttpHistoryCursor {
            backend: self.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            long_poll,
            filter,
            buffer: VecDeque::new(),
            page_token: None,
            pages: 0,
        }))
    }
}

/// Page-at-a-time cursor. The first page is fetched on the first pull.
#[derive(Debug)]
struct HttpHistoryCursor {
    backend: TemporalHttpBackend,
    workflow_id: String,
    run_id: String,
    long_poll: bool,
    filter: HistoryFilter,
    buffer: VecDeque<HistoryEvent>,
    page_token: Option<String>,
    pages: usize,
}

impl HttpHistoryCursor {
    async fn fetch_page(&mut self) -> Result<(), BackendError> {
        let url = self.backend.history_url(
            &self.workflow_id,
            &self.run_id,
            self.long_poll,
            self.filter,
            self.page_token.as_deref(),
        )?;
        let page: GetHistoryResponse = self.backend.get_json(url).await?;

        let events = page.history.unwrap_or_default().events;
        self.buffer.extend(events.into_iter().map(WireEvent::into_event));
        self.page_token = page.next_page_token.filter(|t| !t.is_empty());
        self.pages += 1;

        debug!(
            workflow_id = %self.workflow_id,
            page = self.pages,
            buffered = self.buffer.len(),
            more = self.page_token.is_some(),
            "Fetched history page"
        );
        Ok(())
    }
}

#[async_trait]
impl HistoryCursor for HttpHistoryCursor {
    async fn next_event(&mut self) -> Result<Option<HistoryEvent>, BackendError> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Ok(Some(event));
            }
            if self.pages > 0 && self.page_token.is_none() {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }
}

/// Parse a backend address, defaulting to `http://` when no scheme is given.
pub fn parse_address(address: &str) -> Result<Url, BackendError> {
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let url = Url::parse(&candidate).map_err(|e| BackendError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(BackendError::InvalidAddress {
            address: address.to_string(),
            reason: "address cannot be a base URL".to_string(),
        });
    }
    Ok(url)
}

/// Temporal error bodies are `{"code": .., "message": ..}`; keep just the message.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> TemporalHttpBackend {
        TemporalHttpBackend::new(
            Client::new(),
            parse_address("localhost:7243").unwrap(),
            "default",
        )
    }

    #[test]
    fn test_parse_address_adds_scheme() {
        assert_eq!(
            parse_address("localhost:7243").unwrap().as_str(),
            "http://localhost:7243/"
        );
        assert_eq!(
            parse_address("https://temporal.example.com").unwrap().as_str(),
            "https://temporal.example.com/"
        );
        assert!(parse_address("http://").is_err());
    }

    #[test]
    fn test_history_url_encodes_workflow_id() {
        let url = backend()
            .history_url("order/42", "run-1", false, HistoryFilter::AllEvents, Some("tok"))
            .unwrap();
        assert_eq!(url.path(), "/api/v1/namespaces/default/workflows/order%2F42/history");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("execution.runId".into(), "run-1".into())));
        assert!(pairs.contains(&("nextPageToken".into(), "tok".into())));
        assert!(pairs.contains(&("waitNewEvent".into(), "false".into())));
        assert!(pairs.contains(&(
            "historyEventFilterType".into(),
            "HISTORY_EVENT_FILTER_TYPE_ALL_EVENT".into()
        )));
    }

    #[test]
    fn test_history_url_omits_empty_run_id() {
        let url = backend()
            .with_page_size(100)
            .history_url("wf", "", true, HistoryFilter::AllEvents, None)
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(!pairs.iter().any(|(k, _)| k == "execution.runId"));
        assert!(pairs.contains(&("maximumPageSize".into(), "100".into())));
        assert!(pairs.contains(&("waitNewEvent".into(), "true".into())));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"code":5,"message":"workflow not found"}"#),
            "workflow not found"
        );
        assert_eq!(error_message("Service Unavailable\n"), "Service Unavailable");
    }
}
