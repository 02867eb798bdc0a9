//! ACP wire vocabulary: method names, JSON-RPC envelopes, and session updates.
//!
//! Session updates are decoded into the closed [`SessionUpdate`] enum. Kinds
//! this build does not model land in [`SessionUpdate::Unknown`] so callers can
//! log and drop them without failing the stream.

use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::message::{PlanEntry, PlanEntryStatus};
use crate::models::permission::{PermissionOption, PermissionRequest};
use crate::models::tool_call::{ToolCallContent, ToolCallPatch, ToolCallStatus, ToolKind};
use crate::{AppError, Result};

/// ACP protocol revision spoken by this client.
pub const PROTOCOL_VERSION: u64 = 1;

/// `initialize` request.
pub const METHOD_INITIALIZE: &str = "initialize";
/// `session/new` request.
pub const METHOD_SESSION_NEW: &str = "session/new";
/// `session/load` request.
pub const METHOD_SESSION_LOAD: &str = "session/load";
/// `session/prompt` request.
pub const METHOD_SESSION_PROMPT: &str = "session/prompt";
/// `session/cancel` notification.
pub const METHOD_SESSION_CANCEL: &str = "session/cancel";
/// Agent-to-client `session/update` notification.
pub const METHOD_SESSION_UPDATE: &str = "session/update";
/// Agent-to-client `session/request_permission` request.
pub const METHOD_REQUEST_PERMISSION: &str = "session/request_permission";

/// JSON-RPC "method not found" error code.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "invalid params" error code.
pub const INVALID_PARAMS: i64 = -32602;

/// Error object carried by a JSON-RPC response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        Self::Acp(format!("agent error {}: {}", err.code, err.message))
    }
}

/// Raw JSON-RPC envelope as read from the agent.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// A decoded `session/update` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Streamed reply text.
    AgentMessageChunk {
        /// Text fragment.
        text: String,
    },
    /// Streamed reasoning text.
    AgentThoughtChunk {
        /// Text fragment.
        text: String,
    },
    /// Echo of user input replayed during `session/load`.
    UserMessageChunk {
        /// Text fragment.
        text: String,
    },
    /// A tool call was announced or re-announced.
    ToolCall(ToolCallPatch),
    /// Fields of a known tool call changed.
    ToolCallUpdate(ToolCallPatch),
    /// The agent published or revised its plan.
    Plan {
        /// Plan steps.
        entries: Vec<PlanEntry>,
    },
    /// The agent's slash-command list changed.
    AvailableCommandsUpdate,
    /// Any other update kind.
    Unknown {
        /// Value of the `sessionUpdate` discriminator.
        kind: String,
    },
}

#[derive(Debug, Deserialize)]
struct ContentChunk {
    content: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireToolCall {
    tool_call_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    kind: Option<ToolKind>,
    #[serde(default)]
    status: Option<ToolCallStatus>,
    #[serde(default)]
    raw_input: Option<Value>,
    #[serde(default)]
    content: Option<Vec<Value>>,
    #[serde(default)]
    raw_output: Option<Value>,
}

impl WireToolCall {
    fn into_patch(self) -> ToolCallPatch {
        ToolCallPatch {
            call_id: self.tool_call_id,
            title: self.title,
            kind: self.kind,
            status: self.status,
            raw_input: self.raw_input,
            content: self
                .content
                .map(|items| items.into_iter().map(content_from_wire).collect()),
            raw_output: self.raw_output,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePlan {
    #[serde(default)]
    entries: Vec<WirePlanEntry>,
}

#[derive(Debug, Deserialize)]
struct WirePlanEntry {
    content: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    status: Option<PlanEntryStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePermissionParams {
    tool_call: WireToolCall,
    #[serde(default)]
    options: Vec<PermissionOption>,
}

/// Decode the `update` object of a `session/update` notification.
///
/// # Errors
///
/// Returns `AppError::Acp` if the discriminator is missing or a known kind
/// carries a malformed payload.
pub fn parse_session_update(update: Value) -> Result<SessionUpdate> {
    let kind = update
        .get("sessionUpdate")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Acp("session/update missing `sessionUpdate`".into()))?
        .to_owned();

    let parsed = match kind.as_str() {
        "agent_message_chunk" => SessionUpdate::AgentMessageChunk {
            text: chunk_text(update)?,
        },
        "agent_thought_chunk" => SessionUpdate::AgentThoughtChunk {
            text: chunk_text(update)?,
        },
        "user_message_chunk" => SessionUpdate::UserMessageChunk {
            text: chunk_text(update)?,
        },
        "tool_call" => SessionUpdate::ToolCall(decode::<WireToolCall>(&kind, update)?.into_patch()),
        "tool_call_update" => {
            SessionUpdate::ToolCallUpdate(decode::<WireToolCall>(&kind, update)?.into_patch())
        }
        "plan" => {
            let plan = decode::<WirePlan>(&kind, update)?;
            SessionUpdate::Plan {
                entries: plan
                    .entries
                    .into_iter()
                    .map(|e| PlanEntry {
                        content: e.content,
                        priority: e.priority.unwrap_or_else(|| "medium".into()),
                        status: e.status.unwrap_or(PlanEntryStatus::Pending),
                    })
                    .collect(),
            }
        }
        "available_commands_update" => SessionUpdate::AvailableCommandsUpdate,
        _ => SessionUpdate::Unknown { kind },
    };
    Ok(parsed)
}

/// Decode the params of a `session/request_permission` request.
///
/// # Errors
///
/// Returns `AppError::Acp` if `toolCall.toolCallId` is missing.
pub fn parse_permission_request(params: Value) -> Result<PermissionRequest> {
    let wire: WirePermissionParams = serde_json::from_value(params)
        .map_err(|e| AppError::Acp(format!("malformed permission request: {e}")))?;

    let description = wire
        .tool_call
        .raw_input
        .as_ref()
        .and_then(|input| input.get("description").or_else(|| input.get("command")))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Ok(PermissionRequest {
        title: wire
            .tool_call
            .title
            .clone()
            .unwrap_or_else(|| "Permission request".into()),
        description,
        raw_input: wire.tool_call.raw_input,
        call_id: wire.tool_call.tool_call_id,
        options: wire.options,
    })
}

/// Translate one wire content item into a [`ToolCallContent`].
#[must_use]
pub fn content_from_wire(item: Value) -> ToolCallContent {
    match item.get("type").and_then(Value::as_str) {
        Some("diff") => {
            let path = item.get("path").and_then(Value::as_str);
            let new_text = item.get("newText").and_then(Value::as_str);
            if let (Some(path), Some(new_text)) = (path, new_text) {
                return ToolCallContent::Diff {
                    path: path.to_owned(),
                    old_text: item
                        .get("oldText")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    new_text: new_text.to_owned(),
                };
            }
        }
        Some("content") => {
            let inner = item.get("content");
            if inner.and_then(|c| c.get("type")).and_then(Value::as_str) == Some("text") {
                if let Some(text) = inner.and_then(|c| c.get("text")).and_then(Value::as_str) {
                    return ToolCallContent::Text {
                        text: text.to_owned(),
                    };
                }
            }
        }
        _ => {}
    }
    ToolCallContent::Other { raw: item }
}

/// Build a `session/prompt` content array: one text block, then one
/// `resource_link` block per attached file.
#[must_use]
pub fn prompt_blocks(text: &str, files: &[impl AsRef<Path>]) -> Vec<Value> {
    let mut blocks = vec![json!({ "type": "text", "text": text })];
    for file in files {
        let path = file.as_ref();
        let name = path
            .file_name()
            .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned();
        blocks.push(json!({
            "type": "resource_link",
            "uri": path_to_file_uri(path),
            "name": name,
        }));
    }
    blocks
}

/// Convert a filesystem path to a `file://` URI string.
///
/// On Windows, backslash separators are converted to forward slashes and the
/// drive letter is preserved: `C:\foo\bar` → `file:///C:/foo/bar`.
#[must_use]
pub fn path_to_file_uri(path: &Path) -> String {
    let forward = path.to_string_lossy().replace('\\', "/");
    if forward.starts_with('/') {
        format!("file://{forward}")
    } else {
        format!("file:///{forward}")
    }
}

fn chunk_text(update: Value) -> Result<String> {
    let chunk: ContentChunk = serde_json::from_value(update)
        .map_err(|e| AppError::Acp(format!("malformed content chunk: {e}")))?;
    match chunk.content.get("type").and_then(Value::as_str) {
        Some("text") => Ok(chunk
            .content
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()),
        other => Err(AppError::Acp(format!(
            "unsupported chunk content type: {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &str, update: Value) -> Result<T> {
    serde_json::from_value(update).map_err(|e| AppError::Acp(format!("malformed {kind}: {e}")))
}
