//! Text injected ahead of a conversation's first user message.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Marker after which the presentation layer appends attached-file listings.
pub const FILES_MARKER: &str = "[[CONDUCTOR_FILES]]";

/// Content as sent to the agent: everything before [`FILES_MARKER`], with
/// trailing whitespace trimmed. Unchanged when the marker is absent.
#[must_use]
pub fn strip_files_marker(content: &str) -> &str {
    match content.split_once(FILES_MARKER) {
        Some((head, _)) => head.trim_end(),
        None => content,
    }
}

/// Wrap `content` with the preset and workspace-access blocks.
///
/// Returns `content` unchanged when there is no preset and no additional
/// directory.
#[must_use]
pub fn prepare_first_message(
    content: &str,
    preset_context: Option<&str>,
    workspace: &Path,
    additional_dirs: &[PathBuf],
) -> String {
    let mut sections = Vec::new();

    if let Some(preset) = preset_context.filter(|p| !p.is_empty()) {
        sections.push(format!(
            "[Assistant Rules - You MUST follow these instructions]\n{preset}"
        ));
    }

    if !additional_dirs.is_empty() {
        let workspace = workspace.to_string_lossy();
        let workspace = if workspace.trim().is_empty() {
            "(not set)".into()
        } else {
            workspace
        };
        let dirs = additional_dirs
            .iter()
            .map(|d| format!("- {}", d.display()))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "[Workspace Access]\nPrimary workspace (cwd): {workspace}\nAdditional accessible directories:\n{dirs}\nUse absolute paths when operating outside the primary workspace."
        ));
    }

    if sections.is_empty() {
        return content.to_owned();
    }
    format!("{}\n\n[User Request]\n{content}", sections.join("\n\n"))
}

/// Clean a user-supplied list of extra directories.
///
/// Trims entries, drops empty ones, resolves relative paths against the
/// current directory, removes duplicates (first wins), and drops anything
/// that resolves to the workspace root.
#[must_use]
pub fn normalize_additional_dirs(workspace: &Path, dirs: &[String]) -> Vec<PathBuf> {
    let root = absolutize(workspace);
    let mut seen = HashSet::new();
    dirs.iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .map(|d| absolutize(Path::new(d)))
        .filter(|d| *d != root)
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

/// Absolute, lexically normalized form of `path`.
fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
