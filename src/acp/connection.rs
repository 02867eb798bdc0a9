//! Client side of one ACP JSON-RPC connection.
//!
//! [`AcpConnection::start`] spawns three tasks over an agent's stdio: the
//! writer, the reader, and a router that matches responses to outstanding
//! requests and turns agent notifications and requests into
//! [`AgentEvent`]s. The connection is generic over the byte streams so tests
//! can play the agent over [`tokio::io::duplex`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acp::protocol::{
    self, RpcError, INVALID_PARAMS, METHOD_INITIALIZE, METHOD_NOT_FOUND,
    METHOD_REQUEST_PERMISSION, METHOD_SESSION_CANCEL, METHOD_SESSION_LOAD, METHOD_SESSION_NEW,
    METHOD_SESSION_PROMPT, METHOD_SESSION_UPDATE, PROTOCOL_VERSION,
};
use crate::acp::reader::{run_reader, Inbound};
use crate::acp::writer::run_writer;
use crate::driver::AgentEvent;
use crate::{AppError, Result};

type Reply = std::result::Result<Value, RpcError>;

/// Outstanding client requests: JSON-RPC id → reply slot.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Open permission requests: tool call id → agent's JSON-RPC request id.
type PermissionMap = Arc<Mutex<HashMap<String, Value>>>;

const CHANNEL_CAPACITY: usize = 256;

/// A live ACP connection to one agent.
#[derive(Debug)]
pub struct AcpConnection {
    label: String,
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    permissions: PermissionMap,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl AcpConnection {
    /// Start the reader, writer, and router tasks.
    ///
    /// Agent events are delivered on `events`; [`AgentEvent::Terminated`] is
    /// sent once when the agent's stdout closes.
    pub fn start<R, W>(
        label: &str,
        stdout: R,
        stdin: W,
        events: mpsc::Sender<AgentEvent>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();
        let pending = PendingMap::default();
        let permissions = PermissionMap::default();

        let writer_label = label.to_owned();
        let writer_cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = run_writer(writer_label.clone(), stdin, outbound_rx, writer_cancel).await
            {
                warn!(label = writer_label, %err, "acp writer exited with error");
            }
        });

        let reader_label = label.to_owned();
        let reader_cancel = shutdown.clone();
        tokio::spawn(async move {
            let _ = run_reader(reader_label, stdout, inbound_tx, reader_cancel).await;
        });

        let router = Router {
            label: label.to_owned(),
            outbound: outbound.clone(),
            pending: Arc::clone(&pending),
            permissions: Arc::clone(&permissions),
            events,
            closed: closed.clone(),
        };
        tokio::spawn(router.run(inbound_rx, shutdown.clone()));

        Self {
            label: label.to_owned(),
            outbound,
            pending,
            permissions,
            next_id: AtomicU64::new(1),
            shutdown,
            closed,
        }
    }

    /// Send a request and await its reply.
    ///
    /// # Errors
    ///
    /// - `AppError::Acp("agent error ...")` if the agent replied with an error.
    /// - `AppError::Acp("... connection closed ...")` if the stream ended first.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let msg = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        if self.outbound.send(msg).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AppError::Acp(format!("{method}: connection closed")));
        }
        debug!(label = self.label, id, method, "acp request sent");

        tokio::select! {
            biased;
            reply = rx => match reply {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.into()),
                Err(_) => Err(AppError::Acp(format!("{method}: connection closed before reply"))),
            },
            () = self.closed.cancelled() => {
                self.pending.lock().await.remove(&id);
                Err(AppError::Acp(format!("{method}: connection closed before reply")))
            }
        }
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the writer has shut down.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let msg = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.outbound
            .send(msg)
            .await
            .map_err(|_| AppError::Acp(format!("{method}: connection closed")))
    }

    /// Perform the `initialize` exchange.
    ///
    /// # Errors
    ///
    /// Propagates request failures.
    pub async fn initialize(&self) -> Result<Value> {
        let result = self
            .request(
                METHOD_INITIALIZE,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientCapabilities": {
                        "fs": { "readTextFile": false, "writeTextFile": false },
                        "terminal": false
                    },
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;
        let agent_version = result.get("protocolVersion").and_then(Value::as_u64);
        if agent_version != Some(PROTOCOL_VERSION) {
            warn!(
                label = self.label,
                ?agent_version,
                "agent negotiated a different ACP protocol version"
            );
        }
        info!(label = self.label, "acp initialize complete");
        Ok(result)
    }

    /// Open a fresh session rooted at `cwd` and return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the reply lacks a `sessionId`.
    pub async fn new_session(&self, cwd: &Path) -> Result<String> {
        let result = self
            .request(
                METHOD_SESSION_NEW,
                json!({ "cwd": cwd.to_string_lossy(), "mcpServers": [] }),
            )
            .await?;
        result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AppError::Acp("session/new reply missing sessionId".into()))
    }

    /// Resume an existing session.
    ///
    /// # Errors
    ///
    /// Propagates the agent's rejection.
    pub async fn load_session(&self, session_id: &str, cwd: &Path) -> Result<()> {
        self.request(
            METHOD_SESSION_LOAD,
            json!({
                "sessionId": session_id,
                "cwd": cwd.to_string_lossy(),
                "mcpServers": []
            }),
        )
        .await?;
        Ok(())
    }

    /// Run one prompt turn and return the agent's stop reason.
    ///
    /// # Errors
    ///
    /// Propagates request failures.
    pub async fn prompt(&self, session_id: &str, text: &str, files: &[PathBuf]) -> Result<String> {
        let result = self
            .request(
                METHOD_SESSION_PROMPT,
                json!({
                    "sessionId": session_id,
                    "prompt": protocol::prompt_blocks(text, files),
                }),
            )
            .await?;
        Ok(result
            .get("stopReason")
            .and_then(Value::as_str)
            .unwrap_or("end_turn")
            .to_owned())
    }

    /// Ask the agent to abandon the current turn.
    ///
    /// Open permission requests are answered with a `cancelled` outcome first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the writer has shut down.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let open: Vec<Value> = self.permissions.lock().await.drain().map(|(_, id)| id).collect();
        for id in open {
            self.reply(id, json!({ "outcome": { "outcome": "cancelled" } }))
                .await?;
        }
        self.notify(METHOD_SESSION_CANCEL, json!({ "sessionId": session_id }))
            .await
    }

    /// Answer the permission request for `call_id` with `option_id`.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if no request is open for `call_id`.
    /// - `AppError::Acp` if the writer has shut down.
    pub async fn respond_permission(&self, call_id: &str, option_id: &str) -> Result<()> {
        let id = self.permissions.lock().await.remove(call_id).ok_or_else(|| {
            AppError::NotFound(format!("no pending permission request for call '{call_id}'"))
        })?;
        self.reply(
            id,
            json!({ "outcome": { "outcome": "selected", "optionId": option_id } }),
        )
        .await
    }

    /// Stop the reader and writer; the agent sees stdin close.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether the agent's stream has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn reply(&self, id: Value, result: Value) -> Result<()> {
        self.outbound
            .send(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
            .await
            .map_err(|_| AppError::Acp("reply: connection closed".into()))
    }
}

impl Drop for AcpConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

struct Router {
    label: String,
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    permissions: PermissionMap,
    events: mpsc::Sender<AgentEvent>,
    closed: CancellationToken,
}

impl Router {
    async fn run(self, mut inbound_rx: mpsc::Receiver<Inbound>, shutdown: CancellationToken) {
        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                frame = inbound_rx.recv() => frame,
            };
            let Some(frame) = frame else { break };
            if let Inbound::Closed { reason } = frame {
                self.finish(reason).await;
                return;
            }
            self.route(frame).await;
        }
        self.finish("connection closed".into()).await;
    }

    async fn route(&self, frame: Inbound) {
        match frame {
            Inbound::Response { id, outcome } => {
                let slot = self.pending.lock().await.remove(&id);
                match slot {
                    Some(slot) => {
                        let _ = slot.send(outcome);
                    }
                    None => debug!(label = self.label, id, "acp: reply for unknown request"),
                }
            }
            Inbound::Notification { method, params } if method == METHOD_SESSION_UPDATE => {
                let Some(update) = params.get("update").cloned() else {
                    warn!(label = self.label, "acp: session/update without `update`");
                    return;
                };
                match protocol::parse_session_update(update) {
                    Ok(update) => self.emit(AgentEvent::SessionUpdate(update)).await,
                    Err(err) => warn!(label = self.label, %err, "acp: dropping session update"),
                }
            }
            Inbound::Notification { method, .. } => {
                debug!(label = self.label, method, "acp: ignoring notification");
            }
            Inbound::Request { id, method, params } if method == METHOD_REQUEST_PERMISSION => {
                match protocol::parse_permission_request(params) {
                    Ok(request) => {
                        self.permissions
                            .lock()
                            .await
                            .insert(request.call_id.clone(), id);
                        self.emit(AgentEvent::PermissionRequested(request)).await;
                    }
                    Err(err) => {
                        warn!(label = self.label, %err, "acp: bad permission request");
                        self.reply_error(id, INVALID_PARAMS, &err.to_string()).await;
                    }
                }
            }
            Inbound::Request { id, method, .. } => {
                debug!(label = self.label, method, "acp: unsupported agent request");
                self.reply_error(id, METHOD_NOT_FOUND, &format!("method not found: {method}"))
                    .await;
            }
            Inbound::Closed { .. } => {}
        }
    }

    async fn finish(&self, reason: String) {
        self.closed.cancel();
        self.pending.lock().await.clear();
        self.permissions.lock().await.clear();
        info!(label = self.label, reason, "acp connection closed");
        self.emit(AgentEvent::Terminated { reason }).await;
    }

    async fn emit(&self, event: AgentEvent) {
        if self.events.send(event).await.is_err() {
            debug!(label = self.label, "acp: event receiver dropped");
        }
    }

    async fn reply_error(&self, id: Value, code: i64, message: &str) {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        });
        if self.outbound.send(msg).await.is_err() {
            debug!(label = self.label, "acp: writer gone, error reply dropped");
        }
    }
}
