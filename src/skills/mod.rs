//! Managed skill library and its distribution into engine discovery
//! directories.
//!
//! Ownership of a distributed copy is proven by two independent facts: the
//! target directory's manifest lists it AND the copy carries the provenance
//! marker file. Anything failing either check belongs to the engine or the
//! user and is never modified.

pub mod detect;
pub mod distributor;
pub mod inject;
pub mod library;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::models::engine::EngineKind;

/// Manifest listing the skills this crate placed in a target directory.
pub const MANIFEST_FILENAME: &str = ".conductor-manifest.json";
/// Marker written inside every managed copy.
pub const PROVENANCE_MARKER: &str = ".conductor-managed";
/// Marker file contents.
pub const PROVENANCE_MARKER_CONTENT: &str = "managed-by-conductor\n";
/// Per-skill classification file inside the library.
pub const SKILL_METADATA_FILENAME: &str = ".conductor-skill.json";
/// Legacy location of builtin skills inside the library.
pub const LEGACY_BUILTIN_DIR: &str = "_builtin";
/// Skill manifest file every skill directory must contain.
pub const SKILL_MD: &str = "SKILL.md";
/// Value of `managedBy` in manifest and metadata files.
pub const MANAGED_BY: &str = "conductor";

/// Engines with a native skill discovery directory.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkillEngine {
    /// `.claude/skills`
    Claude,
    /// `.agents/skills`
    Codex,
    /// `.gemini/skills`
    Gemini,
}

impl SkillEngine {
    /// Every engine with a discovery directory.
    pub const ALL: [Self; 3] = [Self::Claude, Self::Codex, Self::Gemini];

    /// Discovery directory relative to a workspace or home root.
    #[must_use]
    pub fn relative_dir(self) -> PathBuf {
        let parent = match self {
            Self::Claude => ".claude",
            Self::Codex => ".agents",
            Self::Gemini => ".gemini",
        };
        Path::new(parent).join("skills")
    }

    /// Discovery directory under `root`.
    #[must_use]
    pub fn dir_in(self, root: &Path) -> PathBuf {
        root.join(self.relative_dir())
    }

    /// Discovery directory used by an agent engine, if it has one.
    #[must_use]
    pub fn for_engine(kind: EngineKind) -> Option<Self> {
        match kind {
            EngineKind::Claude | EngineKind::Custom => Some(Self::Claude),
            EngineKind::Codex => Some(Self::Codex),
            EngineKind::Gemini => Some(Self::Gemini),
            EngineKind::Goose | EngineKind::Auggie | EngineKind::Opencode | EngineKind::Qwen => {
                None
            }
        }
    }
}
