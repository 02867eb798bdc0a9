//! Reconciling copy of the skill library into engine discovery directories.
//!
//! One pass over a target directory:
//!
//! 1. Compute the desired set (all builtins plus the enabled optional skills).
//! 2. Read the existing manifest, used only to prove ownership.
//! 3. Place each desired skill: copy when absent, replace a legacy managed
//!    symlink, refresh an owned copy whose source `SKILL.md` is newer, and
//!    skip anything else.
//! 4. Remove undesired entries that are owned or legacy managed symlinks.
//! 5. Rewrite the manifest with exactly the skills placed in this pass.
//!
//! Failures on a single skill are logged and the pass continues. Concurrent
//! passes over the same directory are not safe; callers serialize them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

use super::inject::inject_skill_path;
use super::library::SkillLibrary;
use super::{
    SkillEngine, MANAGED_BY, MANIFEST_FILENAME, PROVENANCE_MARKER, PROVENANCE_MARKER_CONTENT,
    SKILL_MD,
};
use crate::{AppError, Result};

/// Suffix of the hidden sibling a copy is assembled in before it is moved
/// into place.
const STAGING_SUFFIX: &str = ".staging";

/// Manifest stored at the root of a target directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always `conductor`.
    pub managed_by: String,
    /// Skills placed by the last pass.
    pub skills: Vec<String>,
}

impl Manifest {
    fn lists(&self, name: &str) -> bool {
        self.skills.iter().any(|s| s == name)
    }
}

/// Outcome of one distribution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Directory reconciled.
    pub target_dir: PathBuf,
    /// Skills copied in this pass.
    pub copied: Vec<String>,
    /// Owned skills left untouched because they were current.
    pub unchanged: Vec<String>,
    /// Desired skills skipped because the entry is not ours.
    pub skipped: Vec<String>,
    /// Stale owned entries removed.
    pub removed: Vec<String>,
}

impl DistributionReport {
    /// Skills recorded in the manifest: copied plus unchanged.
    #[must_use]
    pub fn placed(&self) -> Vec<String> {
        let mut placed: Vec<String> = self.copied.iter().chain(&self.unchanged).cloned().collect();
        placed.sort();
        placed
    }
}

enum Placement {
    Copied,
    Unchanged,
    Skipped,
}

/// Whether a skill belongs in the desired set.
///
/// Builtins always do. Optional skills do when the enabled list is absent
/// or empty, or names them.
#[must_use]
pub fn should_distribute(name: &str, builtin: bool, enabled: Option<&[String]>) -> bool {
    if builtin {
        return true;
    }
    match enabled {
        None | Some([]) => true,
        Some(list) => list.iter().any(|s| s == name),
    }
}

/// Read a target directory's manifest; `None` if missing, unreadable, or foreign.
#[must_use]
pub fn read_manifest(target_dir: &Path) -> Option<Manifest> {
    let raw = fs::read_to_string(target_dir.join(MANIFEST_FILENAME)).ok()?;
    let manifest: Manifest = serde_json::from_str(&raw).ok()?;
    (manifest.managed_by == MANAGED_BY).then_some(manifest)
}

/// Whether `entry` carries the provenance marker.
#[must_use]
pub fn has_provenance_marker(entry: &Path) -> bool {
    entry.join(PROVENANCE_MARKER).is_file()
}

/// Whether `entry` is a symlink into the library (the legacy layout).
#[must_use]
pub fn is_managed_symlink(entry: &Path, library_root: &Path) -> bool {
    let Ok(meta) = fs::symlink_metadata(entry) else {
        return false;
    };
    if !meta.file_type().is_symlink() {
        return false;
    }
    let Ok(target) = fs::read_link(entry) else {
        return false;
    };
    let resolved = if target.is_absolute() {
        target
    } else {
        entry
            .parent()
            .map_or_else(|| target.clone(), |parent| parent.join(&target))
    };
    resolved.starts_with(library_root)
}

/// Whether `entry` is a copy this crate owns: listed AND marked.
#[must_use]
pub fn is_owned_copy(name: &str, manifest: Option<&Manifest>, entry: &Path) -> bool {
    manifest.is_some_and(|m| m.lists(name)) && has_provenance_marker(entry)
}

/// Distributes one library into target directories.
#[derive(Debug, Clone)]
pub struct SkillDistributor {
    library: SkillLibrary,
}

impl SkillDistributor {
    /// Distributor for `library`.
    #[must_use]
    pub fn new(library: SkillLibrary) -> Self {
        Self { library }
    }

    /// Underlying library.
    #[must_use]
    pub fn library(&self) -> &SkillLibrary {
        &self.library
    }

    /// Reconcile the discovery directory of `engine` inside `workspace`.
    ///
    /// # Errors
    ///
    /// See [`Self::distribute_to`].
    pub fn distribute_for(
        &self,
        engine: SkillEngine,
        workspace: &Path,
        enabled: Option<&[String]>,
    ) -> Result<DistributionReport> {
        self.distribute_to(&engine.dir_in(workspace), enabled)
    }

    /// Reconcile `target_dir` against the library.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Skill` if `target_dir` cannot be created or its
    /// manifest cannot be written. Per-skill failures are logged only.
    pub fn distribute_to(
        &self,
        target_dir: &Path,
        enabled: Option<&[String]>,
    ) -> Result<DistributionReport> {
        let span = info_span!("distribute_skills", target_dir = %target_dir.display());
        let _guard = span.enter();

        let catalog = self.library.discover();
        let desired: Vec<String> = catalog
            .builtins
            .iter()
            .filter(|name| should_distribute(name, true, enabled))
            .chain(
                catalog
                    .optional
                    .iter()
                    .filter(|name| should_distribute(name, false, enabled)),
            )
            .cloned()
            .collect();

        fs::create_dir_all(target_dir).map_err(|err| {
            AppError::Skill(format!(
                "cannot create skill directory {}: {err}",
                target_dir.display()
            ))
        })?;

        let manifest = read_manifest(target_dir);
        let mut report = DistributionReport {
            target_dir: target_dir.to_path_buf(),
            ..DistributionReport::default()
        };

        for name in &desired {
            let source = self.library.resolve_source(name);
            let target = target_dir.join(name);
            match self.place(name, &source, &target, manifest.as_ref()) {
                Ok(Placement::Copied) => report.copied.push(name.clone()),
                Ok(Placement::Unchanged) => report.unchanged.push(name.clone()),
                Ok(Placement::Skipped) => report.skipped.push(name.clone()),
                Err(err) => warn!(skill = name.as_str(), %err, "skill distribution failed"),
            }
        }

        let desired: HashSet<&str> = desired.iter().map(String::as_str).collect();
        report.removed = self.cleanup(target_dir, &desired, manifest.as_ref());

        write_manifest(target_dir, &report.placed())?;

        if !report.copied.is_empty() || !report.removed.is_empty() {
            info!(
                copied = report.copied.len(),
                unchanged = report.unchanged.len(),
                removed = report.removed.len(),
                "skills distributed"
            );
        }
        Ok(report)
    }

    fn place(
        &self,
        name: &str,
        source: &Path,
        target: &Path,
        manifest: Option<&Manifest>,
    ) -> Result<Placement> {
        if fs::symlink_metadata(target).is_ok() {
            if is_managed_symlink(target, self.library.root()) {
                debug!(skill = name, "replacing legacy skill symlink with a copy");
                remove_entry(target)?;
            } else if is_owned_copy(name, manifest, target) {
                if !needs_update(source, target) {
                    return Ok(Placement::Unchanged);
                }
                debug!(skill = name, "source SKILL.md is newer, refreshing copy");
                remove_entry(target)?;
            } else {
                info!(skill = name, "skipped: entry exists and is not managed");
                return Ok(Placement::Skipped);
            }
        }

        install_copy(name, source, target)?;
        if let Err(err) = inject_skill_path(target) {
            warn!(skill = name, %err, "skill path hint injection failed");
        }
        Ok(Placement::Copied)
    }

    fn cleanup(
        &self,
        target_dir: &Path,
        desired: &HashSet<&str>,
        manifest: Option<&Manifest>,
    ) -> Vec<String> {
        let entries = match fs::read_dir(target_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(%err, "failed to list skill directory for cleanup");
                return Vec::new();
            }
        };

        let mut removed = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == MANIFEST_FILENAME || desired.contains(name.as_str()) {
                continue;
            }
            let path = entry.path();
            let owned = is_managed_symlink(&path, self.library.root())
                || is_owned_copy(&name, manifest, &path);
            if !owned {
                continue;
            }
            match remove_entry(&path) {
                Ok(()) => {
                    info!(skill = name.as_str(), "removed stale managed skill");
                    removed.push(name);
                }
                Err(err) => warn!(skill = name.as_str(), %err, "failed to remove stale skill"),
            }
        }
        removed.sort();
        removed
    }
}

/// Whether the source `SKILL.md` is newer than the target's.
///
/// Anything that cannot be compared counts as stale.
fn needs_update(source: &Path, target: &Path) -> bool {
    let mtime = |dir: &Path| -> Option<SystemTime> {
        fs::metadata(dir.join(SKILL_MD)).ok()?.modified().ok()
    };
    match (mtime(source), mtime(target)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn write_manifest(target_dir: &Path, skills: &[String]) -> Result<()> {
    let manifest = Manifest {
        managed_by: MANAGED_BY.to_owned(),
        skills: skills.to_vec(),
    };
    let raw = serde_json::to_string_pretty(&manifest)?;
    fs::write(target_dir.join(MANIFEST_FILENAME), raw).map_err(|err| {
        AppError::Skill(format!(
            "cannot write manifest in {}: {err}",
            target_dir.display()
        ))
    })
}

fn remove_entry(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Copy `source` to `target` through a marked staging sibling, so a failed
/// copy never leaves an unmarked half-copy behind.
fn install_copy(name: &str, source: &Path, target: &Path) -> Result<()> {
    let staging = target.with_file_name(format!(".{name}{STAGING_SUFFIX}"));
    if fs::symlink_metadata(&staging).is_ok() {
        remove_entry(&staging)?;
    }

    if let Err(err) = stage_and_swap(source, &staging, target) {
        if fs::symlink_metadata(&staging).is_ok() {
            if let Err(cleanup) = remove_entry(&staging) {
                warn!(skill = name, %cleanup, "failed to remove staged skill copy");
            }
        }
        return Err(err);
    }
    Ok(())
}

fn stage_and_swap(source: &Path, staging: &Path, target: &Path) -> Result<()> {
    copy_dir_recursive(source, staging)?;
    fs::write(staging.join(PROVENANCE_MARKER), PROVENANCE_MARKER_CONTENT)?;
    fs::rename(staging, target)?;
    Ok(())
}

fn copy_dir_recursive(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(AppError::Skill(format!(
            "skill source {} is not a directory",
            source.display()
        )));
    }
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|err| AppError::Io(err.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| AppError::Io(err.to_string()))?;
        let dest = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
