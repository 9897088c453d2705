//! temporal-mcp - workflow history tools for MCP clients
//!
//! Exposes a Temporal cluster's execution histories to Model Context Protocol
//! clients as two read-only tools:
//!
//! - **`workflow_history`**: the normalized history of one execution, with a
//!   short summary and a guide for reading it
//! - **`failed_workflows`**: every open execution whose history carries an
//!   error, with the last error message
//!
//! # Architecture
//!
//! - [`history`]: raw event model the backend adapters decode into
//! - [`normalize`]: allow-list reduction of one raw event to a [`NormalizedEvent`]
//! - [`aggregate`]: streams one history into a [`HistoryResult`]
//! - [`scanner`]: failure scan over open executions
//! - [`backend`]: the [`WorkflowBackend`] trait, the Temporal HTTP adapter and
//!   an in-memory backend
//! - [`tools`]: the MCP tool registry
//! - [`mcp`]: JSON-RPC dispatch plus stdio and HTTP transports
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use temporal_mcp::{AppConfig, TemporalHttpBackend, build_server};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let backend = Arc::new(TemporalHttpBackend::from_config(&config.temporal)?);
//!     let shutdown = CancellationToken::new();
//!     let server = build_server(&config, backend, config.load_instructions()?.into(), shutdown.clone());
//!     temporal_mcp::mcp::stdio::serve_stdio(Arc::new(server), shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod backend;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod mcp;
pub mod normalize;
pub mod scanner;
pub mod tools;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use aggregate::{HistoryAggregator, HistoryResult};
pub use backend::{
    BackendError, ExecutionRef, HistoryCursor, HistoryFilter, InMemoryBackend,
    TemporalHttpBackend, WorkflowBackend,
};
pub use config::AppConfig;
pub use error::{HistoryError, ServiceResult};
pub use history::{EventType, HistoryEvent};
pub use mcp::McpServer;
pub use normalize::{NormalizedEvent, normalize};
pub use scanner::{FailedWorkflowEntry, FailedWorkflowsResult, FailureScanner};
pub use tools::ToolRegistry;

/// Wire the tools over `backend` into an MCP server.
pub fn build_server(
    config: &AppConfig,
    backend: Arc<dyn WorkflowBackend>,
    instructions: Arc<str>,
    shutdown: CancellationToken,
) -> McpServer {
    let aggregator = HistoryAggregator::new(Arc::clone(&backend));
    let scanner = FailureScanner::new(backend).with_concurrency(config.scan.concurrency);
    let tools = ToolRegistry::with_defaults(aggregator, scanner, Arc::clone(&instructions));
    McpServer::new(tools, instructions, shutdown)
}
