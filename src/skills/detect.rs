//! Read-only queries over engine discovery directories.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::distributor::{is_managed_symlink, is_owned_copy, read_manifest};
use super::library::SkillLibrary;
use super::{SkillEngine, MANIFEST_FILENAME, SKILL_MD};

/// A skill found in a discovery directory that this crate does not manage.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DetectedSkill {
    /// Entry name.
    pub name: String,
    /// Engine whose directory holds it.
    pub engine: SkillEngine,
    /// Entry path.
    pub path: PathBuf,
    /// Whether the entry has a `SKILL.md`.
    pub has_skill_md: bool,
}

/// Entries in the workspace's engine directories that are not owned copies
/// or legacy managed symlinks.
#[must_use]
pub fn detect_engine_native_skills(workspace: &Path, library: &SkillLibrary) -> Vec<DetectedSkill> {
    let mut found = Vec::new();
    for engine in SkillEngine::ALL {
        let dir = engine.dir_in(workspace);
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        let manifest = read_manifest(&dir);
        let mut names: Vec<(String, PathBuf)> = entries
            .filter_map(std::result::Result::ok)
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .filter(|(name, _)| name != MANIFEST_FILENAME && !name.starts_with('.'))
            .collect();
        names.sort();

        for (name, path) in names {
            if is_managed_symlink(&path, library.root())
                || is_owned_copy(&name, manifest.as_ref(), &path)
            {
                continue;
            }
            found.push(DetectedSkill {
                has_skill_md: path.join(SKILL_MD).exists(),
                name,
                engine,
                path,
            });
        }
    }
    found
}

/// Skill directories installed under the home-level Claude and Gemini
/// discovery directories.
#[must_use]
pub fn detect_global_skills(home: &Path) -> Vec<DetectedSkill> {
    let mut found = Vec::new();
    for engine in [SkillEngine::Claude, SkillEngine::Gemini] {
        let Ok(entries) = fs::read_dir(engine.dir_in(home)) else {
            continue;
        };
        let mut dirs: Vec<(String, PathBuf)> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .filter(|(name, _)| !name.starts_with('.'))
            .collect();
        dirs.sort();

        for (name, path) in dirs {
            found.push(DetectedSkill {
                has_skill_md: path.join(SKILL_MD).exists(),
                name,
                engine,
                path,
            });
        }
    }
    found
}

/// Convert an enabled-skills whitelist into the blacklist Gemini expects.
///
/// Returns `None` when nothing needs disabling: no list, an empty list, or a
/// list that enables every optional skill. Builtins are never disabled.
#[must_use]
pub fn compute_gemini_disabled_skills(
    library: &SkillLibrary,
    enabled: Option<&[String]>,
) -> Option<Vec<String>> {
    let enabled = enabled.filter(|list| !list.is_empty())?;
    let disabled: Vec<String> = library
        .discover()
        .optional
        .into_iter()
        .filter(|name| !enabled.contains(name))
        .collect();
    (!disabled.is_empty()).then_some(disabled)
}
