//! ACP writer task.
//!
//! Serializes outbound JSON-RPC values to single lines and writes them to the
//! agent's stdin. Dropping the task closes stdin, which ACP agents treat as a
//! request to shut down.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Writer task: drain `msg_rx` into `stdin` as NDJSON.
///
/// Exits when `cancel` fires or every sender is dropped; `stdin` is shut
/// down on exit.
///
/// # Errors
///
/// Returns `AppError::Acp("write failed: ...")` if the agent stopped reading.
pub async fn run_writer<W>(
    label: String,
    mut stdin: W,
    mut msg_rx: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let outcome = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(label, "acp writer: cancellation received, stopping");
                break Ok(());
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!(label, "acp writer: message channel closed, stopping");
                    break Ok(());
                };
                if let Err(e) = write_line(&mut stdin, &value).await {
                    warn!(label, error = %e, "acp writer: write to stdin failed");
                    break Err(e);
                }
            }
        }
    };

    if let Err(e) = stdin.shutdown().await {
        debug!(label, error = %e, "acp writer: stdin shutdown failed");
    }
    outcome
}

async fn write_line<W>(stdin: &mut W, value: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::Acp(format!("failed to serialise outbound message: {e}")))?;
    bytes.push(b'\n');
    stdin
        .write_all(&bytes)
        .await
        .map_err(|e| AppError::Acp(format!("write failed: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| AppError::Acp(format!("write failed: {e}")))
}
