//! ACP reader task.
//!
//! Reads NDJSON lines from an agent's stdout and classifies each one as a
//! response, a notification, or an agent-initiated request. Classified
//! frames are forwarded through an [`mpsc`] channel; routing them is the
//! connection's job.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::AcpCodec;
use crate::acp::protocol::{Envelope, RpcError};
use crate::{AppError, Result};

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a request this client sent.
    Response {
        /// Numeric id assigned by the client.
        id: u64,
        /// Result payload or error object.
        outcome: std::result::Result<Value, RpcError>,
    },
    /// Agent notification (no id).
    Notification {
        /// Method name.
        method: String,
        /// Parameters, `Null` when absent.
        params: Value,
    },
    /// Agent request expecting a reply.
    Request {
        /// Agent-chosen id, echoed verbatim in the reply.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters, `Null` when absent.
        params: Value,
    },
    /// The stream ended; no further frames follow.
    Closed {
        /// Why the stream ended.
        reason: String,
    },
}

/// Parse one NDJSON line.
///
/// Returns `Ok(None)` for blank lines and for responses whose id this client
/// could not have issued.
///
/// # Errors
///
/// Returns `AppError::Acp` for invalid JSON or an envelope that is neither a
/// request, a notification, nor a response.
pub fn parse_inbound_line(line: &str) -> Result<Option<Inbound>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Envelope =
        serde_json::from_str(line).map_err(|e| AppError::Acp(format!("malformed json: {e}")))?;

    match (envelope.method, envelope.id) {
        (Some(method), Some(id)) => Ok(Some(Inbound::Request {
            id,
            method,
            params: envelope.params.unwrap_or(Value::Null),
        })),
        (Some(method), None) => Ok(Some(Inbound::Notification {
            method,
            params: envelope.params.unwrap_or(Value::Null),
        })),
        (None, Some(id)) => {
            let Some(id) = id.as_u64() else {
                debug!(?id, "acp reader: response with foreign id, skipping");
                return Ok(None);
            };
            let outcome = match envelope.error {
                Some(err) => Err(err),
                None => Ok(envelope.result.unwrap_or(Value::Null)),
            };
            Ok(Some(Inbound::Response { id, outcome }))
        }
        (None, None) => Err(AppError::Acp(
            "envelope has neither `method` nor `id`".into(),
        )),
    }
}

/// Reader task: decode lines from `stdout` and forward [`Inbound`] frames.
///
/// Malformed lines are logged and skipped. On EOF or an I/O error an
/// [`Inbound::Closed`] frame is sent before returning. Cancellation exits
/// without a closing frame.
///
/// # Errors
///
/// Always returns `Ok(())`; failures are reported through the channel.
pub async fn run_reader<R>(
    label: String,
    stdout: R,
    inbound_tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, AcpCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(label, "acp reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(label, "acp reader: EOF");
                        send_closed(&inbound_tx, &label, "stream closed".into()).await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(label, error = %e, "acp reader: IO error, stopping");
                        send_closed(&inbound_tx, &label, format!("stream error: {e}")).await;
                        break;
                    }
                    Some(Ok(line)) => match parse_inbound_line(&line) {
                        Ok(Some(frame)) => {
                            if inbound_tx.send(frame).await.is_err() {
                                debug!(label, "acp reader: inbound channel closed, stopping");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(label, error = %e, raw_line = %line, "acp reader: parse error, skipping line");
                        }
                    },
                }
            }
        }
    }

    Ok(())
}

async fn send_closed(tx: &mpsc::Sender<Inbound>, label: &str, reason: String) {
    if tx.send(Inbound::Closed { reason }).await.is_err() {
        debug!(label, "acp reader: inbound channel closed before close frame");
    }
}
