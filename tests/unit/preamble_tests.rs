//! Unit tests for first-message preparation and additional directory cleanup.

use std::path::{Path, PathBuf};

use agent_conductor::orchestrator::preamble::{
    normalize_additional_dirs, prepare_first_message, strip_files_marker, FILES_MARKER,
};

// ── prepare_first_message ───────────────────────────────────────────────────

/// Without a preset or extra directories the content is untouched.
#[test]
fn plain_content_is_unchanged() {
    let out = prepare_first_message("hello", None, Path::new("/repo/main"), &[]);
    assert_eq!(out, "hello");
}

/// Extra directories produce the workspace-access block.
#[test]
fn additional_dirs_produce_workspace_access_block() {
    let out = prepare_first_message(
        "read files",
        None,
        Path::new("/repo/main"),
        &[PathBuf::from("/repo/shared")],
    );

    assert_eq!(
        out,
        "[Workspace Access]\n\
         Primary workspace (cwd): /repo/main\n\
         Additional accessible directories:\n\
         - /repo/shared\n\
         Use absolute paths when operating outside the primary workspace.\n\
         \n\
         [User Request]\n\
         read files"
    );
}

/// The preset block comes first, then workspace access, then the request.
#[test]
fn preset_precedes_workspace_access() {
    let out = prepare_first_message(
        "go",
        Some("Always answer in French."),
        Path::new("/repo/main"),
        &[PathBuf::from("/data")],
    );

    let rules = out
        .find("[Assistant Rules - You MUST follow these instructions]\nAlways answer in French.")
        .expect("rules block");
    let access = out.find("[Workspace Access]").expect("access block");
    let request = out.find("[User Request]\ngo").expect("request block");
    assert!(rules < access && access < request, "blocks out of order: {out}");
    assert!(out.ends_with("[User Request]\ngo"));
}

/// A preset alone still wraps the request.
#[test]
fn preset_without_dirs() {
    let out = prepare_first_message("go", Some("Be brief."), Path::new("/repo"), &[]);
    assert_eq!(
        out,
        "[Assistant Rules - You MUST follow these instructions]\nBe brief.\n\n[User Request]\ngo"
    );
}

/// An empty preset counts as absent.
#[test]
fn empty_preset_is_ignored() {
    assert_eq!(prepare_first_message("go", Some(""), Path::new("/repo"), &[]), "go");
}

/// An unset workspace is rendered as `(not set)`.
#[test]
fn unset_workspace_is_marked() {
    let out = prepare_first_message("go", None, Path::new(""), &[PathBuf::from("/data")]);
    assert!(out.contains("Primary workspace (cwd): (not set)"), "got: {out}");
}

// ── strip_files_marker ──────────────────────────────────────────────────────

/// Everything from the marker on is dropped and trailing space trimmed.
#[test]
fn files_marker_and_listing_are_stripped() {
    let content = format!("review this   \n{FILES_MARKER}\n- a.rs\n- b.rs");
    assert_eq!(strip_files_marker(&content), "review this");
}

/// Content without the marker passes through.
#[test]
fn content_without_marker_passes_through() {
    assert_eq!(strip_files_marker("just text  "), "just text  ");
}

// ── normalize_additional_dirs ───────────────────────────────────────────────

/// Blank entries, duplicates, and the workspace root are removed.
#[test]
fn normalizes_dirs() {
    let dirs = vec![
        "  /repo/shared ".to_owned(),
        String::new(),
        "/repo/main".to_owned(),
        "/repo/shared/".to_owned(),
        "/repo/main/../docs".to_owned(),
        "   ".to_owned(),
    ];

    let out = normalize_additional_dirs(Path::new("/repo/main"), &dirs);

    assert_eq!(
        out,
        vec![PathBuf::from("/repo/shared"), PathBuf::from("/repo/docs")]
    );
}

/// Relative entries resolve against the current directory.
#[test]
fn relative_dirs_become_absolute() {
    let out = normalize_additional_dirs(Path::new("/repo/main"), &["data".to_owned()]);
    let cwd = std::env::current_dir().expect("cwd");
    assert_eq!(out, vec![cwd.join("data")]);
}
