//! Script path hints for distributed skills.
//!
//! Skills that ship scripts get a `[Skill scripts directory: <abs path>]`
//! line in their deployed `SKILL.md` so the agent can call them by absolute
//! path. The hint goes after any YAML frontmatter, because engines require
//! `SKILL.md` to start with `---`.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use super::SKILL_MD;
use crate::Result;

/// Prefix of the injected hint; its presence means "already injected".
pub const PATH_HINT_PREFIX: &str = "[Skill scripts directory:";

const SCRIPT_EXTENSIONS: [&str; 3] = ["py", "js", "sh"];

/// Deepest directory level searched for scripts.
const MAX_SCRIPT_DEPTH: usize = 3;

#[allow(clippy::expect_used)]
static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^---\s*\n[\s\S]*?\n---\s*\n").expect("frontmatter regex"));

/// Whether `dir` holds a `.py`, `.js`, or `.sh` file within three directory
/// levels, ignoring dot entries.
#[must_use]
pub fn has_script_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .max_depth(MAX_SCRIPT_DEPTH + 1)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(std::result::Result::ok)
        .any(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        SCRIPT_EXTENSIONS
                            .iter()
                            .any(|s| s.eq_ignore_ascii_case(ext))
                    })
        })
}

/// Insert the scripts-directory hint into `skill_dir/SKILL.md`.
///
/// No-op when the skill has no `SKILL.md`, no scripts, or already carries a
/// hint. Returns whether the file was modified.
///
/// # Errors
///
/// Returns `AppError::Io` if `SKILL.md` cannot be read or written.
pub fn inject_skill_path(skill_dir: &Path) -> Result<bool> {
    let skill_md = skill_dir.join(SKILL_MD);
    if !skill_md.exists() || !has_script_files(skill_dir) {
        return Ok(false);
    }

    let content = fs::read_to_string(&skill_md)?;
    if content.contains(PATH_HINT_PREFIX) {
        return Ok(false);
    }

    fs::write(&skill_md, with_path_hint(&content, skill_dir))?;
    Ok(true)
}

/// `content` with the hint for `skill_dir` inserted.
#[must_use]
pub fn with_path_hint(content: &str, skill_dir: &Path) -> String {
    let hint = format!("\n{PATH_HINT_PREFIX} {}]\n", skill_dir.display());
    match FRONTMATTER.find(content) {
        Some(frontmatter) => {
            let (head, tail) = content.split_at(frontmatter.end());
            format!("{head}{hint}{tail}")
        }
        None => format!("{hint}\n{content}"),
    }
}
