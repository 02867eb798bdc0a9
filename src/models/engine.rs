//! Agent engine families and their built-in launch defaults.

use serde::{Deserialize, Serialize};

/// An external agent subprocess family speaking ACP over stdio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Claude Code through its ACP bridge.
    Claude,
    /// Codex CLI through its ACP bridge.
    Codex,
    /// Gemini CLI in experimental ACP mode.
    Gemini,
    /// Goose in ACP mode.
    Goose,
    /// Augment's `auggie` CLI.
    Auggie,
    /// `OpenCode` in ACP mode.
    Opencode,
    /// Qwen Code in experimental ACP mode.
    Qwen,
    /// A user-defined engine looked up by its custom engine id.
    Custom,
}

/// Built-in launch defaults for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineDefaults {
    /// Executable looked up on `PATH` when nothing else is configured.
    pub cli_command: &'static str,
    /// Arguments that put the CLI into ACP mode.
    pub acp_args: &'static [&'static str],
}

impl EngineKind {
    /// Every engine family, in presentation order.
    pub const ALL: [Self; 8] = [
        Self::Claude,
        Self::Codex,
        Self::Gemini,
        Self::Goose,
        Self::Auggie,
        Self::Opencode,
        Self::Qwen,
        Self::Custom,
    ];

    /// Stable identifier used in configuration and storage.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Goose => "goose",
            Self::Auggie => "auggie",
            Self::Opencode => "opencode",
            Self::Qwen => "qwen",
            Self::Custom => "custom",
        }
    }

    /// Parse an engine identifier as written in configuration.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// Built-in launch defaults; `None` for custom engines.
    #[must_use]
    pub fn defaults(self) -> Option<EngineDefaults> {
        let defaults = match self {
            Self::Claude => EngineDefaults {
                cli_command: "claude-code-acp",
                acp_args: &[],
            },
            Self::Codex => EngineDefaults {
                cli_command: "codex-acp",
                acp_args: &[],
            },
            Self::Gemini => EngineDefaults {
                cli_command: "gemini",
                acp_args: &["--experimental-acp"],
            },
            Self::Goose => EngineDefaults {
                cli_command: "goose",
                acp_args: &["acp"],
            },
            Self::Auggie => EngineDefaults {
                cli_command: "auggie",
                acp_args: &["--acp"],
            },
            Self::Opencode => EngineDefaults {
                cli_command: "opencode",
                acp_args: &["acp"],
            },
            Self::Qwen => EngineDefaults {
                cli_command: "qwen",
                acp_args: &["--experimental-acp"],
            },
            Self::Custom => return None,
        };
        Some(defaults)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
