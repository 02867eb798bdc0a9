//! Normalized chat messages and merge-key composition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tool_call::ToolCall;

/// Where a message is rendered in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagePosition {
    /// Agent output.
    Left,
    /// User input.
    Right,
    /// System notices.
    Center,
}

/// Flavor of a tips message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TipKind {
    /// Agent reasoning.
    Thought,
    /// Non-fatal warning.
    Warning,
    /// Error surfaced to the user.
    Error,
    /// Positive notice.
    Success,
}

/// Execution status of one plan step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryStatus {
    /// Not started.
    Pending,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
}

/// One step of an agent plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    /// Step description.
    pub content: String,
    /// Priority label as sent by the agent (`high`, `medium`, `low`).
    pub priority: String,
    /// Step status.
    pub status: PlanEntryStatus,
}

/// Message body variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum MessageBody {
    /// Streamed or static text.
    Text {
        /// Text fragment.
        content: String,
    },
    /// Thought, warning, error, or success notice.
    Tips {
        /// Notice text.
        content: String,
        /// Notice flavor.
        kind: TipKind,
    },
    /// A single tool call.
    ToolCall(ToolCall),
    /// Several tool calls shown together.
    ToolGroup(Vec<ToolCall>),
    /// An execution plan.
    Plan {
        /// Agent session the plan belongs to.
        session_id: String,
        /// Plan steps.
        entries: Vec<PlanEntry>,
    },
}

impl MessageBody {
    /// Storage label of the variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Tips { .. } => "tips",
            Self::ToolCall(_) => "tool_call",
            Self::ToolGroup(_) => "tool_group",
            Self::Plan { .. } => "plan",
        }
    }
}

/// A normalized unit of conversation output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier of this emitted unit.
    pub id: String,
    /// Merge key; messages sharing it collapse into one entry.
    pub msg_id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Render position.
    pub position: MessagePosition,
    /// Body.
    pub body: MessageBody,
}

impl Message {
    /// Construct a message with a fresh unique id.
    #[must_use]
    pub fn new(
        conversation_id: &str,
        msg_id: impl Into<String>,
        position: MessagePosition,
        body: MessageBody,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            msg_id: msg_id.into(),
            conversation_id: conversation_id.to_owned(),
            created_at: Utc::now(),
            position,
            body,
        }
    }

    /// Text message.
    #[must_use]
    pub fn text(
        conversation_id: &str,
        msg_id: impl Into<String>,
        position: MessagePosition,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            conversation_id,
            msg_id,
            position,
            MessageBody::Text {
                content: content.into(),
            },
        )
    }

    /// Centered tips message.
    #[must_use]
    pub fn tips(
        conversation_id: &str,
        msg_id: impl Into<String>,
        kind: TipKind,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            conversation_id,
            msg_id,
            MessagePosition::Center,
            MessageBody::Tips {
                content: content.into(),
                kind,
            },
        )
    }

    /// Text content if this is a text message.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// Fold `incoming` into `list`, collapsing by merge key and conversation.
///
/// Text bodies concatenate, tool groups merge by call id, and every other
/// body replaces the existing one. Unmatched messages are appended.
pub fn compose(list: &mut Vec<Message>, incoming: Message) {
    let existing = list
        .iter_mut()
        .rev()
        .find(|m| m.msg_id == incoming.msg_id && m.conversation_id == incoming.conversation_id);

    let Some(existing) = existing else {
        list.push(incoming);
        return;
    };

    match (&mut existing.body, incoming.body) {
        (MessageBody::Text { content }, MessageBody::Text { content: more }) => {
            content.push_str(&more);
        }
        (MessageBody::ToolGroup(calls), MessageBody::ToolGroup(updates)) => {
            for update in updates {
                match calls.iter_mut().find(|c| c.call_id == update.call_id) {
                    Some(call) => *call = update,
                    None => calls.push(update),
                }
            }
        }
        (body, replacement) => *body = replacement,
    }
}
