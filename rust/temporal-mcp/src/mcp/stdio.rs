//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! A reader loop decodes one message per line; every request runs as its own
//! task and a single writer task serializes responses back out, so a slow
//! tool call never blocks `ping` or a cancellation.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Incoming, JsonRpcResponse, McpServer, parse_message};

/// Serve on the process's stdin and stdout until EOF or shutdown.
pub async fn serve_stdio(server: Arc<McpServer>, shutdown: CancellationToken) -> std::io::Result<()> {
    serve(server, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

/// Serve JSON-RPC over an arbitrary byte stream pair.
///
/// Returns once `reader` hits EOF (after in-flight requests finish and their
/// responses are flushed) or once `shutdown` fires.
pub async fn serve<R, W>(
    server: Arc<McpServer>,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_handle = tokio::spawn(writer_task(writer, rx));
    let mut requests = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();

    info!("Serving MCP over stdio");
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown requested, closing stdio transport");
                break;
            }
            Some(joined) = requests.join_next(), if !requests.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Request task failed");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                dispatch_line(&server, &line, &tx, &mut requests);
            }
        }
    }

    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Request task failed");
        }
    }
    drop(tx);
    if let Err(e) = writer_handle.await {
        warn!(error = %e, "Writer task failed");
    }
    Ok(())
}

fn dispatch_line(
    server: &Arc<McpServer>,
    line: &str,
    tx: &mpsc::UnboundedSender<String>,
    requests: &mut JoinSet<()>,
) {
    match parse_message(line) {
        Incoming::Request { id, method, params } => {
            // Registered before spawning so a cancellation on the next line
            // always finds it.
            let cancel = server.register_request(&id);
            let server = Arc::clone(server);
            let tx = tx.clone();
            requests.spawn(async move {
                let response = server
                    .handle_request(id.clone(), &method, params, &cancel)
                    .await;
                server.complete_request(&id);
                if cancel.is_cancelled() {
                    debug!(%id, "Dropping response to cancelled request");
                    return;
                }
                send(&tx, &response);
            });
        }
        Incoming::Notification { method, params } => server.handle_notification(&method, params),
        Incoming::Invalid(response) => send(tx, &response),
        Incoming::Ignored => debug!("Ignoring client response"),
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).is_err() {
                warn!("Writer closed, response dropped");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize response"),
    }
}

async fn writer_task<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(message) = rx.recv().await {
        if writer.write_all(message.as_bytes()).await.is_err() {
            break;
        }
        if writer.write_all(b"\n").await.is_err() {
            break;
        }
        let _ = writer.flush().await;
    }
    let _ = writer.shutdown().await;
}
