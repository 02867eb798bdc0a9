//! Tool call records and their field-merge semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of what a tool call does.
///
/// Protocol kinds without a dedicated variant (`delete`, `move`, `search`,
/// `think`, `fetch`, ...) fold into [`ToolKind::Other`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// File read.
    Read,
    /// File modification.
    Edit,
    /// Command execution.
    Execute,
    /// Anything else.
    #[default]
    #[serde(other)]
    Other,
}

/// Lifecycle status of a tool call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Announced but not started.
    #[default]
    Pending,
    /// Currently running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Aborted before completion.
    Canceled,
}

impl ToolCallStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed | Self::Canceled => 2,
        }
    }

    /// Whether the status ends the tool call's lifecycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` respects monotonic ordering.
    ///
    /// Terminal statuses are final: once reached, no other status is
    /// accepted, not even a different terminal one.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

/// One content fragment attached to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    /// A proposed or applied file change.
    Diff {
        /// File the change applies to.
        path: String,
        /// Previous text; absent for new files.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        /// Replacement text.
        new_text: String,
    },
    /// Plain text output.
    Text {
        /// Text body.
        text: String,
    },
    /// Any other fragment, kept verbatim.
    Other {
        /// Raw wire payload.
        raw: Value,
    },
}

/// A tool call as tracked for presentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Stable call identifier; doubles as the message merge key.
    pub call_id: String,
    /// Human-readable title.
    pub title: String,
    /// Kind classification.
    pub kind: ToolKind,
    /// Current status.
    pub status: ToolCallStatus,
    /// Raw tool input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    /// Ordered content fragments.
    #[serde(default)]
    pub content: Vec<ToolCallContent>,
    /// Raw tool output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

/// A partial tool call observation. Absent fields leave the record untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallPatch {
    /// Call identifier the patch applies to.
    pub call_id: String,
    /// New title.
    pub title: Option<String>,
    /// New kind.
    pub kind: Option<ToolKind>,
    /// New status.
    pub status: Option<ToolCallStatus>,
    /// New raw input.
    pub raw_input: Option<Value>,
    /// Replacement content list.
    pub content: Option<Vec<ToolCallContent>>,
    /// New raw output.
    pub raw_output: Option<Value>,
}

impl ToolCall {
    /// Build a record from the first observation of a call.
    #[must_use]
    pub fn from_patch(patch: ToolCallPatch) -> Self {
        Self {
            title: patch.title.unwrap_or_default(),
            kind: patch.kind.unwrap_or_default(),
            status: patch.status.unwrap_or_default(),
            raw_input: patch.raw_input,
            content: patch.content.unwrap_or_default(),
            raw_output: patch.raw_output,
            call_id: patch.call_id,
        }
    }

    /// Merge a later observation into this record.
    ///
    /// Present fields overwrite, absent fields never clobber, and a status
    /// that would move backwards is ignored.
    pub fn apply(&mut self, patch: ToolCallPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(status) = patch.status {
            if self.status.can_advance_to(status) {
                self.status = status;
            } else {
                tracing::debug!(
                    call_id = self.call_id.as_str(),
                    from = ?self.status,
                    to = ?status,
                    "ignoring tool call status regression"
                );
            }
        }
        if let Some(raw_input) = patch.raw_input {
            self.raw_input = Some(raw_input);
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(raw_output) = patch.raw_output {
            self.raw_output = Some(raw_output);
        }
    }
}
