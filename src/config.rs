//! Global configuration parsing and validation.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::engine::EngineKind;
use crate::{AppError, Result};

/// Stored per-engine launch configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Executable path; may carry trailing arguments for custom engines.
    #[serde(default)]
    pub cli_path: Option<String>,
    /// Argument list replacing the built-in ACP arguments.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Environment variables set on the agent process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Auto-approve permission requests for every conversation on this engine.
    #[serde(default)]
    pub yolo_mode: bool,
}

/// A user-defined ACP engine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CustomEngineConfig {
    /// Identifier referenced by conversations.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Command line; trailing tokens are arguments when `acp_args` is unset.
    pub default_cli_path: String,
    /// Explicit argument list.
    #[serde(default)]
    pub acp_args: Option<Vec<String>>,
    /// Environment variables set on the agent process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Lifecycle timing knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Upper bound on launch plus `initialize` plus session setup.
    #[serde(default = "default_startup_seconds")]
    pub startup_seconds: u64,
    /// Pause after a cooperative stop before force-terminating.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Deadline after which a kill force-terminates regardless.
    #[serde(default = "default_kill_hard_ms")]
    pub kill_hard_ms: u64,
    /// How long finished tool calls stay in adapter memory.
    #[serde(default = "default_tool_call_eviction_seconds")]
    pub tool_call_eviction_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_seconds: default_startup_seconds(),
            kill_grace_ms: default_kill_grace_ms(),
            kill_hard_ms: default_kill_hard_ms(),
            tool_call_eviction_seconds: default_tool_call_eviction_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Startup deadline.
    #[must_use]
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_seconds)
    }

    /// Kill grace period.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Kill hard deadline.
    #[must_use]
    pub fn kill_hard(&self) -> Duration {
        Duration::from_millis(self.kill_hard_ms)
    }

    /// Tool call eviction delay.
    #[must_use]
    pub fn tool_call_eviction(&self) -> Duration {
        Duration::from_secs(self.tool_call_eviction_seconds)
    }
}

fn default_startup_seconds() -> u64 {
    60
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_kill_hard_ms() -> u64 {
    1500
}

fn default_tool_call_eviction_seconds() -> u64 {
    60
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Managed skill library root.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
    /// Home directory scanned for global skills; defaults to `$HOME`.
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
    /// `SQLite` file holding conversations and messages.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Stored per-engine configuration keyed by engine id.
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,
    /// Engine ids hidden from selection.
    #[serde(default)]
    pub disabled_engines: Vec<String>,
    /// User-defined engines.
    #[serde(default)]
    pub custom_engines: Vec<CustomEngineConfig>,
    /// Lifecycle timing.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            skills_dir: default_skills_dir(),
            home_dir: None,
            database_path: None,
            engines: HashMap::new(),
            disabled_engines: Vec::new(),
            custom_engines: Vec::new(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Stored configuration for a built-in engine.
    #[must_use]
    pub fn engine(&self, kind: EngineKind) -> Option<&EngineConfig> {
        self.engines.get(kind.id())
    }

    /// Custom engine definition by id.
    #[must_use]
    pub fn custom_engine(&self, id: &str) -> Option<&CustomEngineConfig> {
        self.custom_engines.iter().find(|c| c.id == id)
    }

    /// Whether an engine id is disabled.
    #[must_use]
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled_engines.iter().any(|d| d == id)
    }

    /// Engine ids available for selection: built-ins then custom engines,
    /// minus disabled ones.
    #[must_use]
    pub fn available_engines(&self) -> Vec<String> {
        EngineKind::ALL
            .into_iter()
            .filter(|kind| *kind != EngineKind::Custom)
            .map(|kind| kind.id().to_owned())
            .chain(self.custom_engines.iter().map(|c| c.id.clone()))
            .filter(|id| !self.is_disabled(id))
            .collect()
    }

    /// Directory scanned for global skills: the configured override, else
    /// the user's home directory.
    #[must_use]
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir.clone().or_else(dirs::home_dir)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for custom in &self.custom_engines {
            if custom.id.trim().is_empty() {
                return Err(AppError::Config("custom engine id must not be empty".into()));
            }
            if custom.default_cli_path.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "custom engine '{}' has an empty command",
                    custom.id
                )));
            }
            if !seen.insert(custom.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate custom engine id '{}'",
                    custom.id
                )));
            }
        }

        if self.timeouts.kill_hard_ms < self.timeouts.kill_grace_ms {
            return Err(AppError::Config(
                "timeouts.kill_hard_ms must not be shorter than kill_grace_ms".into(),
            ));
        }

        Ok(())
    }
}
