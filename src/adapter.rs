//! Translation of ACP session updates into conversation messages.
//!
//! One [`ProtocolAdapter`] exists per conversation. It owns the streaming
//! merge key (so consecutive text chunks collapse into one entry) and the
//! tool call records that later `tool_call_update`s are merged into.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::acp::protocol::SessionUpdate;
use crate::models::message::{Message, MessageBody, MessagePosition, TipKind};
use crate::models::tool_call::{ToolCall, ToolCallPatch};

/// Default time a finished tool call stays in memory.
pub const DEFAULT_EVICTION_DELAY: Duration = Duration::from_secs(60);

type ToolCallMap = Arc<Mutex<HashMap<String, ToolCall>>>;

/// Per-conversation update normalizer.
#[derive(Debug)]
pub struct ProtocolAdapter {
    conversation_id: String,
    current_msg_id: String,
    session_id: String,
    tool_calls: ToolCallMap,
    eviction_delay: Duration,
    cancel: CancellationToken,
}

impl ProtocolAdapter {
    /// Adapter with the default eviction delay.
    #[must_use]
    pub fn new(conversation_id: &str) -> Self {
        Self::with_eviction_delay(conversation_id, DEFAULT_EVICTION_DELAY)
    }

    /// Adapter evicting finished tool calls after `eviction_delay`.
    #[must_use]
    pub fn with_eviction_delay(conversation_id: &str, eviction_delay: Duration) -> Self {
        Self {
            conversation_id: conversation_id.to_owned(),
            current_msg_id: Uuid::new_v4().to_string(),
            session_id: String::new(),
            tool_calls: ToolCallMap::default(),
            eviction_delay,
            cancel: CancellationToken::new(),
        }
    }

    /// Record the engine session id stamped onto plan messages.
    pub fn set_session_id(&mut self, session_id: &str) {
        session_id.clone_into(&mut self.session_id);
    }

    /// Merge key currently used for streamed text.
    #[must_use]
    pub fn current_msg_id(&self) -> &str {
        &self.current_msg_id
    }

    /// Start a new streaming entry.
    pub fn reset_msg_id(&mut self) {
        self.current_msg_id = Uuid::new_v4().to_string();
    }

    /// Snapshot of a tracked tool call.
    #[must_use]
    pub fn tool_call(&self, call_id: &str) -> Option<ToolCall> {
        lock(&self.tool_calls).get(call_id).cloned()
    }

    /// Number of tool calls currently tracked.
    #[must_use]
    pub fn tracked_tool_calls(&self) -> usize {
        lock(&self.tool_calls).len()
    }

    /// Translate one update into zero or more messages.
    pub fn convert(&mut self, update: SessionUpdate) -> Vec<Message> {
        match update {
            SessionUpdate::AgentMessageChunk { text } => {
                vec![Message::text(
                    &self.conversation_id,
                    self.current_msg_id.clone(),
                    MessagePosition::Left,
                    text,
                )]
            }
            SessionUpdate::AgentThoughtChunk { text } => {
                let thought = Message::tips(
                    &self.conversation_id,
                    Uuid::new_v4().to_string(),
                    TipKind::Thought,
                    text,
                );
                self.reset_msg_id();
                vec![thought]
            }
            SessionUpdate::UserMessageChunk { .. } => {
                debug!(
                    conversation_id = self.conversation_id,
                    "ignoring replayed user message chunk"
                );
                Vec::new()
            }
            SessionUpdate::ToolCall(patch) => {
                self.reset_msg_id();
                vec![self.tool_call_message(self.upsert_tool_call(patch))]
            }
            SessionUpdate::ToolCallUpdate(patch) => {
                self.reset_msg_id();
                match self.merge_tool_call_update(patch) {
                    Some(call) => vec![self.tool_call_message(call)],
                    None => Vec::new(),
                }
            }
            SessionUpdate::Plan { entries } => {
                self.reset_msg_id();
                if entries.is_empty() {
                    return Vec::new();
                }
                vec![Message::new(
                    &self.conversation_id,
                    Uuid::new_v4().to_string(),
                    MessagePosition::Left,
                    MessageBody::Plan {
                        session_id: self.session_id.clone(),
                        entries,
                    },
                )]
            }
            SessionUpdate::AvailableCommandsUpdate => {
                self.reset_msg_id();
                Vec::new()
            }
            SessionUpdate::Unknown { kind } => {
                debug!(
                    conversation_id = self.conversation_id,
                    kind, "dropping unrecognized session update"
                );
                Vec::new()
            }
        }
    }

    fn upsert_tool_call(&self, patch: ToolCallPatch) -> ToolCall {
        let merged = match lock(&self.tool_calls).entry(patch.call_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().apply(patch);
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(ToolCall::from_patch(patch)).clone(),
        };
        self.schedule_eviction_if_terminal(&merged);
        merged
    }

    fn merge_tool_call_update(&self, patch: ToolCallPatch) -> Option<ToolCall> {
        let merged = {
            let mut calls = lock(&self.tool_calls);
            let Some(existing) = calls.get_mut(&patch.call_id) else {
                warn!(
                    conversation_id = self.conversation_id,
                    call_id = patch.call_id,
                    "tool call update for unknown call"
                );
                return None;
            };
            existing.apply(patch);
            existing.clone()
        };
        self.schedule_eviction_if_terminal(&merged);
        Some(merged)
    }

    fn tool_call_message(&self, call: ToolCall) -> Message {
        Message::new(
            &self.conversation_id,
            call.call_id.clone(),
            MessagePosition::Left,
            MessageBody::ToolCall(call),
        )
    }

    fn schedule_eviction_if_terminal(&self, call: &ToolCall) {
        if !call.status.is_terminal() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(call_id = call.call_id, "no runtime, tool call eviction skipped");
            return;
        };
        let calls = Arc::clone(&self.tool_calls);
        let cancel = self.cancel.clone();
        let delay = self.eviction_delay;
        let call_id = call.call_id.clone();
        handle.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    lock(&calls).remove(&call_id);
                    debug!(call_id, "evicted finished tool call");
                }
            }
        });
    }
}

impl Drop for ProtocolAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(calls: &ToolCallMap) -> MutexGuard<'_, HashMap<String, ToolCall>> {
    calls.lock().unwrap_or_else(PoisonError::into_inner)
}
