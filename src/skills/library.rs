//! The managed skill library: discovery and builtin classification.
//!
//! Skills live flat under the library root, each in its own directory with a
//! `SKILL.md`. A `.conductor-skill.json` file marks builtins; skills still
//! stored under the legacy `_builtin/` directory count as builtin too.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{LEGACY_BUILTIN_DIR, MANAGED_BY, SKILL_MD, SKILL_METADATA_FILENAME};
use crate::Result;

/// Classification record stored inside a library skill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkillMetadata {
    /// Always `conductor`.
    pub managed_by: String,
    /// Whether the skill is always distributed.
    pub builtin: bool,
    /// Library directory the skill was registered from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
}

/// A skill available in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    /// Directory name.
    pub name: String,
    /// Always distributed when set.
    pub builtin: bool,
    /// Directory the skill is copied from.
    pub source: PathBuf,
}

/// Builtin and optional skill names found in a library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillCatalog {
    /// Builtin skill names, flat entries first, then legacy ones.
    pub builtins: Vec<String>,
    /// Optional skill names.
    pub optional: Vec<String>,
}

/// Read the classification file of a skill directory.
///
/// Returns `None` when the file is missing, unreadable, or not ours.
#[must_use]
pub fn read_skill_metadata(skill_dir: &Path) -> Option<SkillMetadata> {
    let raw = fs::read_to_string(skill_dir.join(SKILL_METADATA_FILENAME)).ok()?;
    let metadata: SkillMetadata = serde_json::from_str(&raw).ok()?;
    (metadata.managed_by == MANAGED_BY).then_some(metadata)
}

/// Write the classification file of a skill directory.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be written.
pub fn write_skill_metadata(skill_dir: &Path, builtin: bool) -> Result<()> {
    let metadata = SkillMetadata {
        managed_by: MANAGED_BY.to_owned(),
        builtin,
        source_dir: Some(skill_dir.to_path_buf()),
    };
    let raw = serde_json::to_string_pretty(&metadata)?;
    fs::write(skill_dir.join(SKILL_METADATA_FILENAME), raw)?;
    Ok(())
}

/// A skill library rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillLibrary {
    root: PathBuf,
}

impl SkillLibrary {
    /// Library rooted at `root`; the directory need not exist.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Library root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Classify every skill in the library.
    ///
    /// Unreadable directories are logged and treated as empty.
    #[must_use]
    pub fn discover(&self) -> SkillCatalog {
        let mut catalog = SkillCatalog::default();

        for (name, dir) in skill_dirs(&self.root) {
            if name == LEGACY_BUILTIN_DIR {
                continue;
            }
            if read_skill_metadata(&dir).is_some_and(|m| m.builtin) {
                catalog.builtins.push(name);
            } else {
                catalog.optional.push(name);
            }
        }

        for (name, _) in skill_dirs(&self.root.join(LEGACY_BUILTIN_DIR)) {
            if !catalog.builtins.contains(&name) {
                catalog.builtins.push(name);
            }
        }

        catalog
    }

    /// Every skill with its resolved source directory.
    #[must_use]
    pub fn skills(&self) -> Vec<Skill> {
        let catalog = self.discover();
        let builtins = catalog.builtins.into_iter().map(|n| (n, true));
        let optional = catalog.optional.into_iter().map(|n| (n, false));
        builtins
            .chain(optional)
            .map(|(name, builtin)| Skill {
                source: self.resolve_source(&name),
                name,
                builtin,
            })
            .collect()
    }

    /// Source directory of `name`: the flat entry, else the legacy builtin one.
    #[must_use]
    pub fn resolve_source(&self, name: &str) -> PathBuf {
        let flat = self.root.join(name);
        if flat.exists() {
            return flat;
        }
        let legacy = self.root.join(LEGACY_BUILTIN_DIR).join(name);
        if legacy.exists() {
            return legacy;
        }
        flat
    }
}

/// Visible subdirectories of `dir` that contain a `SKILL.md`, sorted by name.
fn skill_dirs(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if dir.exists() {
                warn!(dir = %dir.display(), %err, "failed to read skill library");
            }
            return Vec::new();
        }
    };

    let mut found: Vec<(String, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            (!name.starts_with('.') && path.join(SKILL_MD).exists()).then_some((name, path))
        })
        .collect();
    found.sort();
    found
}
