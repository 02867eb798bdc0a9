//! Conversation model and its engine-specific extra data.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::engine::EngineKind;

/// Per-conversation launch overrides; these win over stored engine config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchOverrides {
    /// Explicit executable path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    /// Explicit argument list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment overlay applied on top of configured variables.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// Engine-specific conversation fields, stored as one JSON blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConversationExtra {
    /// Extra directories the agent may read and write besides the workspace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_dirs: Vec<PathBuf>,
    /// Identifier of the custom engine definition when `engine = custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_engine_id: Option<String>,
    /// Launch overrides for this conversation only.
    #[serde(default)]
    pub overrides: LaunchOverrides,
    /// Preset instruction block injected ahead of the first message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_context: Option<String>,
    /// Optional skills to distribute; `None` or empty means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_skills: Option<Vec<String>>,
    /// Auto-approve permission requests for this conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yolo_mode: Option<bool>,
    /// Last engine session token, offered back to the engine for resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acp_session_id: Option<String>,
    /// When `acp_session_id` was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acp_session_updated_at: Option<DateTime<Utc>>,
}

/// A chat conversation bound to one workspace and one engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Conversation {
    /// Unique record identifier.
    pub id: String,
    /// Workspace root; the agent process runs here.
    pub workspace: PathBuf,
    /// Selected engine family.
    pub engine: EngineKind,
    /// Engine-specific data.
    pub extra: ConversationExtra,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Construct a new conversation with a generated identifier.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>, engine: EngineKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            workspace: workspace.into(),
            engine,
            extra: ConversationExtra::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a fresh engine session token.
    pub fn set_session_token(&mut self, session_id: &str) {
        let now = Utc::now();
        self.extra.acp_session_id = Some(session_id.to_owned());
        self.extra.acp_session_updated_at = Some(now);
        self.updated_at = now;
    }

    /// Forget the engine session token so the next start opens a new session.
    pub fn clear_session_token(&mut self) {
        self.extra.acp_session_id = None;
        self.extra.acp_session_updated_at = None;
    }
}
