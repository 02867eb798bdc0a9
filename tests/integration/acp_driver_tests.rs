//! Integration tests for the ACP driver against a scripted agent.
//!
//! The agent side of a [`tokio::io::duplex`] pipe is played by
//! [`FakeAgent`], which reads the client's NDJSON frames and writes replies
//! and notifications in whatever order a test needs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

use agent_conductor::acp::protocol::{
    SessionUpdate, METHOD_INITIALIZE, METHOD_NOT_FOUND, METHOD_SESSION_CANCEL,
    METHOD_SESSION_LOAD, METHOD_SESSION_NEW, METHOD_SESSION_PROMPT, INVALID_PARAMS,
};
use agent_conductor::driver::acp_driver::AcpDriver;
use agent_conductor::driver::{AgentDriver, AgentEvent};
use agent_conductor::AppError;

const STEP: Duration = Duration::from_secs(5);

struct FakeAgent {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeAgent {
    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(STEP, self.lines.next_line())
            .await
            .expect("client frame in time")
            .expect("read line")
            .expect("client stream open");
        serde_json::from_str(&line).expect("client frame is JSON")
    }

    async fn expect_request(&mut self, method: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["method"], method, "unexpected frame: {frame}");
        frame
    }

    async fn send(&mut self, frame: Value) {
        let mut line = frame.to_string();
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("write frame");
    }

    async fn reply(&mut self, request: &Value, result: Value) {
        self.send(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
            .await;
    }

    async fn reply_error(&mut self, request: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": message }
        }))
        .await;
    }

    async fn update(&mut self, update: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "session/update",
            "params": { "sessionId": "sess-1", "update": update }
        }))
        .await;
    }

    /// Answer `initialize` and `session/new` with `sess-1`.
    async fn handshake(&mut self) {
        let init = self.expect_request(METHOD_INITIALIZE).await;
        self.reply(&init, json!({ "protocolVersion": 1 })).await;
        let new = self.expect_request(METHOD_SESSION_NEW).await;
        self.reply(&new, json!({ "sessionId": "sess-1" })).await;
    }
}

struct ClientSide {
    stdout: ReadHalf<DuplexStream>,
    stdin: WriteHalf<DuplexStream>,
}

fn wire() -> (FakeAgent, ClientSide) {
    let (client, agent) = tokio::io::duplex(64 * 1024);
    let (stdout, stdin) = tokio::io::split(client);
    let (agent_read, agent_write) = tokio::io::split(agent);
    (
        FakeAgent {
            lines: BufReader::new(agent_read).lines(),
            writer: agent_write,
        },
        ClientSide { stdout, stdin },
    )
}

fn establish(
    client: ClientSide,
    resume: Option<&'static str>,
) -> (
    tokio::task::JoinHandle<agent_conductor::Result<AcpDriver>>,
    mpsc::Receiver<AgentEvent>,
) {
    let (events_tx, events_rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move {
        AcpDriver::establish(
            "conv-1",
            client.stdout,
            client.stdin,
            None,
            events_tx,
            resume,
            Path::new("/repo/main"),
        )
        .await
    });
    (handle, events_rx)
}

async fn connected() -> (FakeAgent, Arc<AcpDriver>, mpsc::Receiver<AgentEvent>) {
    let (mut agent, client) = wire();
    let (handle, events) = establish(client, None);
    agent.handshake().await;
    let driver = handle.await.expect("join").expect("establish");
    (agent, Arc::new(driver), events)
}

async fn next_event(events: &mut mpsc::Receiver<AgentEvent>) -> AgentEvent {
    tokio::time::timeout(STEP, events.recv())
        .await
        .expect("event in time")
        .expect("event channel open")
}

// ── Session setup ───────────────────────────────────────────────────────────

/// The handshake advertises protocol version 1 and opens a session at `cwd`.
#[tokio::test]
async fn establish_opens_new_session() {
    let (mut agent, client) = wire();
    let (handle, _events) = establish(client, None);

    let init = agent.expect_request(METHOD_INITIALIZE).await;
    assert_eq!(init["jsonrpc"], "2.0");
    assert_eq!(init["params"]["protocolVersion"], 1);
    assert_eq!(init["params"]["clientCapabilities"]["terminal"], false);
    agent.reply(&init, json!({ "protocolVersion": 1 })).await;

    let new = agent.expect_request(METHOD_SESSION_NEW).await;
    assert_eq!(new["params"]["cwd"], "/repo/main");
    assert_eq!(new["params"]["mcpServers"], json!([]));
    agent.reply(&new, json!({ "sessionId": "sess-1" })).await;

    let driver = handle.await.expect("join").expect("establish");
    assert_eq!(driver.session_id(), "sess-1");
}

/// A stored token is offered through `session/load` and kept on success.
#[tokio::test]
async fn resume_keeps_stored_session() {
    let (mut agent, client) = wire();
    let (handle, _events) = establish(client, Some("sess-old"));

    let init = agent.expect_request(METHOD_INITIALIZE).await;
    agent.reply(&init, json!({ "protocolVersion": 1 })).await;
    let load = agent.expect_request(METHOD_SESSION_LOAD).await;
    assert_eq!(load["params"]["sessionId"], "sess-old");
    agent.reply(&load, json!({})).await;

    let driver = handle.await.expect("join").expect("establish");
    assert_eq!(driver.session_id(), "sess-old");
}

/// A rejected resume falls back to a new session.
#[tokio::test]
async fn rejected_resume_falls_back_to_new_session() {
    let (mut agent, client) = wire();
    let (handle, _events) = establish(client, Some("sess-old"));

    let init = agent.expect_request(METHOD_INITIALIZE).await;
    agent.reply(&init, json!({ "protocolVersion": 1 })).await;
    let load = agent.expect_request(METHOD_SESSION_LOAD).await;
    agent.reply_error(&load, -32000, "unknown session").await;
    let new = agent.expect_request(METHOD_SESSION_NEW).await;
    agent.reply(&new, json!({ "sessionId": "sess-2" })).await;

    let driver = handle.await.expect("join").expect("establish");
    assert_eq!(driver.session_id(), "sess-2");
}

/// An `initialize` error aborts the bootstrap.
#[tokio::test]
async fn initialize_error_fails_establish() {
    let (mut agent, client) = wire();
    let (handle, _events) = establish(client, None);

    let init = agent.expect_request(METHOD_INITIALIZE).await;
    agent.reply_error(&init, -32603, "boom").await;

    let err = handle.await.expect("join").expect_err("must fail");
    assert_eq!(err, AppError::Acp("agent error -32603: boom".into()));
}

// ── Prompt turns ────────────────────────────────────────────────────────────

/// Updates stream as events, then the turn finishes with the stop reason.
#[tokio::test]
async fn prompt_streams_updates_then_finishes() {
    let (mut agent, driver, mut events) = connected().await;

    let turn = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.prompt("Hello agent".into(), Vec::new()).await }
    });

    let prompt = agent.expect_request(METHOD_SESSION_PROMPT).await;
    assert_eq!(prompt["params"]["sessionId"], "sess-1");
    assert_eq!(
        prompt["params"]["prompt"],
        json!([{ "type": "text", "text": "Hello agent" }])
    );
    agent
        .update(json!({
            "sessionUpdate": "agent_message_chunk",
            "content": { "type": "text", "text": "Hi there" }
        }))
        .await;
    agent.reply(&prompt, json!({ "stopReason": "max_tokens" })).await;

    assert_eq!(turn.await.expect("join").expect("prompt"), "max_tokens");
    assert_eq!(
        next_event(&mut events).await,
        AgentEvent::SessionUpdate(SessionUpdate::AgentMessageChunk {
            text: "Hi there".into()
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        AgentEvent::TurnFinished {
            stop_reason: "max_tokens".into()
        }
    );
}

/// A reply without `stopReason` counts as `end_turn`.
#[tokio::test]
async fn missing_stop_reason_defaults_to_end_turn() {
    let (mut agent, driver, _events) = connected().await;

    let turn = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.prompt("x".into(), Vec::new()).await }
    });
    let prompt = agent.expect_request(METHOD_SESSION_PROMPT).await;
    agent.reply(&prompt, json!({})).await;

    assert_eq!(turn.await.expect("join").expect("prompt"), "end_turn");
}

/// Attached files become `resource_link` blocks after the text.
#[tokio::test]
async fn prompt_attaches_files() {
    let (mut agent, driver, _events) = connected().await;

    let turn = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move {
            driver
                .prompt("see file".into(), vec!["/repo/main/notes.md".into()])
                .await
        }
    });
    let prompt = agent.expect_request(METHOD_SESSION_PROMPT).await;
    assert_eq!(
        prompt["params"]["prompt"][1],
        json!({
            "type": "resource_link",
            "uri": "file:///repo/main/notes.md",
            "name": "notes.md"
        })
    );
    agent.reply(&prompt, json!({ "stopReason": "end_turn" })).await;
    turn.await.expect("join").expect("prompt");
}

// ── Agent requests ──────────────────────────────────────────────────────────

/// A permission request surfaces as an event and is answered by call id.
#[tokio::test]
async fn permission_request_round_trip() {
    let (mut agent, driver, mut events) = connected().await;

    agent
        .send(json!({
            "jsonrpc": "2.0",
            "id": "perm-1",
            "method": "session/request_permission",
            "params": {
                "sessionId": "sess-1",
                "toolCall": {
                    "toolCallId": "call-1",
                    "title": "Run tests",
                    "rawInput": { "command": "cargo test" }
                },
                "options": [
                    { "optionId": "allow", "name": "Allow", "kind": "allow_once" },
                    { "optionId": "reject", "name": "Reject", "kind": "reject_once" }
                ]
            }
        }))
        .await;

    let AgentEvent::PermissionRequested(request) = next_event(&mut events).await else {
        panic!("expected a permission request");
    };
    assert_eq!(request.call_id, "call-1");
    assert_eq!(request.description.as_deref(), Some("cargo test"));
    assert_eq!(request.options.len(), 2);

    driver
        .resolve_permission("call-1", "allow")
        .await
        .expect("resolve");
    let answer = agent.recv().await;
    assert_eq!(answer["id"], "perm-1");
    assert_eq!(
        answer["result"],
        json!({ "outcome": { "outcome": "selected", "optionId": "allow" } })
    );

    let err = driver
        .resolve_permission("call-1", "allow")
        .await
        .expect_err("already answered");
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

/// Cancel answers open permission requests before notifying the agent.
#[tokio::test]
async fn cancel_answers_open_permissions() {
    let (mut agent, driver, mut events) = connected().await;

    agent
        .send(json!({
            "jsonrpc": "2.0",
            "id": 41,
            "method": "session/request_permission",
            "params": {
                "toolCall": { "toolCallId": "call-9" },
                "options": [{ "optionId": "ok", "name": "OK", "kind": "allow_once" }]
            }
        }))
        .await;
    next_event(&mut events).await;

    driver.cancel_turn().await.expect("cancel");

    let answer = agent.recv().await;
    assert_eq!(answer["id"], 41);
    assert_eq!(answer["result"]["outcome"]["outcome"], "cancelled");
    let cancel = agent.expect_request(METHOD_SESSION_CANCEL).await;
    assert_eq!(cancel["params"]["sessionId"], "sess-1");
    assert!(cancel.get("id").is_none(), "cancel is a notification");
}

/// Unsupported agent requests get "method not found".
#[tokio::test]
async fn unknown_agent_request_is_rejected() {
    let (mut agent, _driver, _events) = connected().await;

    agent
        .send(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "fs/read_text_file",
            "params": { "path": "/etc/hosts" }
        }))
        .await;

    let answer = agent.recv().await;
    assert_eq!(answer["id"], 7);
    assert_eq!(answer["error"]["code"], METHOD_NOT_FOUND);
}

/// A permission request without a tool call id is "invalid params".
#[tokio::test]
async fn malformed_permission_request_is_rejected() {
    let (mut agent, _driver, _events) = connected().await;

    agent
        .send(json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "session/request_permission",
            "params": { "options": [] }
        }))
        .await;

    let answer = agent.recv().await;
    assert_eq!(answer["id"], 8);
    assert_eq!(answer["error"]["code"], INVALID_PARAMS);
}

// ── Termination ─────────────────────────────────────────────────────────────

/// Closing the agent's stdout fails the open prompt and emits `Terminated`.
#[tokio::test]
async fn agent_exit_terminates_connection() {
    let (mut agent, driver, mut events) = connected().await;

    let turn = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move { driver.prompt("x".into(), Vec::new()).await }
    });
    agent.expect_request(METHOD_SESSION_PROMPT).await;
    drop(agent);

    let err = turn.await.expect("join").expect_err("turn must fail");
    assert!(matches!(err, AppError::Acp(_)), "got {err:?}");
    assert!(matches!(
        next_event(&mut events).await,
        AgentEvent::Terminated { .. }
    ));
}
