//! Permission requests raised by an agent and the confirmations shown for them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Semantic class of a permission option.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this one invocation.
    AllowOnce,
    /// Allow this and all future invocations of the same tool.
    AllowAlways,
    /// Reject this one invocation.
    RejectOnce,
    /// Reject this and all future invocations.
    RejectAlways,
    /// Any kind this build does not know about.
    #[serde(other)]
    Unknown,
}

impl PermissionOptionKind {
    /// Whether choosing this option lets the tool run.
    #[must_use]
    pub fn is_allow(self) -> bool {
        matches!(self, Self::AllowOnce | Self::AllowAlways)
    }
}

/// A named choice offered to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Identifier echoed back to the agent when chosen.
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Semantic class.
    pub kind: PermissionOptionKind,
}

/// A permission request as decoded from the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRequest {
    /// Tool call the request guards.
    pub call_id: String,
    /// Short title.
    pub title: String,
    /// Longer description, usually derived from the raw input.
    pub description: Option<String>,
    /// Raw tool input, if the agent sent one.
    pub raw_input: Option<Value>,
    /// Options the user may choose from.
    pub options: Vec<PermissionOption>,
}

impl PermissionRequest {
    /// First option that lets the tool run, if any.
    #[must_use]
    pub fn first_allow_option(&self) -> Option<&PermissionOption> {
        self.options.iter().find(|opt| opt.kind.is_allow())
    }
}

/// A pending confirmation surfaced on the presentation bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Confirmation {
    /// Confirmation identifier; equal to the call id.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Tool call the confirmation resolves.
    pub call_id: String,
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Options the user may choose from.
    pub options: Vec<PermissionOption>,
}

impl Confirmation {
    /// Build the confirmation shown for `request` in `conversation_id`.
    #[must_use]
    pub fn from_request(conversation_id: &str, request: &PermissionRequest) -> Self {
        Self {
            id: request.call_id.clone(),
            conversation_id: conversation_id.to_owned(),
            call_id: request.call_id.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            options: request.options.clone(),
        }
    }
}
