//! Unit tests for ACP session update and permission request decoding.

use std::path::PathBuf;

use serde_json::json;

use agent_conductor::acp::protocol::{
    content_from_wire, parse_permission_request, parse_session_update, prompt_blocks,
    SessionUpdate,
};
use agent_conductor::models::message::PlanEntryStatus;
use agent_conductor::models::permission::PermissionOptionKind;
use agent_conductor::models::tool_call::{ToolCallContent, ToolCallStatus, ToolKind};
use agent_conductor::AppError;

// ── Session updates ─────────────────────────────────────────────────────────

/// Message chunks carry their text.
#[test]
fn agent_message_chunk_decodes_text() {
    let update = parse_session_update(json!({
        "sessionUpdate": "agent_message_chunk",
        "content": { "type": "text", "text": "Hello" }
    }))
    .expect("decode");

    assert_eq!(
        update,
        SessionUpdate::AgentMessageChunk {
            text: "Hello".into()
        }
    );
}

/// Thought chunks are distinguished from reply chunks.
#[test]
fn agent_thought_chunk_decodes_text() {
    let update = parse_session_update(json!({
        "sessionUpdate": "agent_thought_chunk",
        "content": { "type": "text", "text": "thinking" }
    }))
    .expect("decode");

    assert!(matches!(update, SessionUpdate::AgentThoughtChunk { text } if text == "thinking"));
}

/// A non-text chunk is a protocol error.
#[test]
fn image_chunk_is_rejected() {
    let err = parse_session_update(json!({
        "sessionUpdate": "agent_message_chunk",
        "content": { "type": "image", "data": "..." }
    }))
    .expect_err("image chunks are unsupported");

    assert!(matches!(err, AppError::Acp(ref msg) if msg.contains("image")), "got {err:?}");
}

/// `tool_call` fields map onto a patch; unknown kinds fold into `Other`.
#[test]
fn tool_call_decodes_into_patch() {
    let update = parse_session_update(json!({
        "sessionUpdate": "tool_call",
        "toolCallId": "call-1",
        "title": "Run tests",
        "kind": "search",
        "status": "in_progress",
        "rawInput": { "command": "cargo test" }
    }))
    .expect("decode");

    let SessionUpdate::ToolCall(patch) = update else {
        panic!("expected a tool call update");
    };
    assert_eq!(patch.call_id, "call-1");
    assert_eq!(patch.title.as_deref(), Some("Run tests"));
    assert_eq!(patch.kind, Some(ToolKind::Other));
    assert_eq!(patch.status, Some(ToolCallStatus::InProgress));
    assert_eq!(patch.raw_input, Some(json!({ "command": "cargo test" })));
    assert!(patch.content.is_none(), "absent content stays absent");
}

/// A `tool_call_update` with only a status leaves every other field unset.
#[test]
fn tool_call_update_keeps_absent_fields_absent() {
    let update = parse_session_update(json!({
        "sessionUpdate": "tool_call_update",
        "toolCallId": "call-1",
        "status": "completed"
    }))
    .expect("decode");

    let SessionUpdate::ToolCallUpdate(patch) = update else {
        panic!("expected a tool call update");
    };
    assert_eq!(patch.status, Some(ToolCallStatus::Completed));
    assert!(patch.title.is_none());
    assert!(patch.kind.is_none());
    assert!(patch.raw_output.is_none());
}

/// A tool call without an id is malformed.
#[test]
fn tool_call_without_id_is_rejected() {
    let err = parse_session_update(json!({ "sessionUpdate": "tool_call", "title": "x" }))
        .expect_err("toolCallId is required");
    assert!(matches!(err, AppError::Acp(_)));
}

/// Plan entries default their priority and status.
#[test]
fn plan_entries_get_defaults() {
    let update = parse_session_update(json!({
        "sessionUpdate": "plan",
        "entries": [
            { "content": "Write code", "priority": "high", "status": "in_progress" },
            { "content": "Test it" }
        ]
    }))
    .expect("decode");

    let SessionUpdate::Plan { entries } = update else {
        panic!("expected a plan");
    };
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, PlanEntryStatus::InProgress);
    assert_eq!(entries[1].priority, "medium");
    assert_eq!(entries[1].status, PlanEntryStatus::Pending);
}

/// Kinds this build does not model are surfaced as `Unknown`.
#[test]
fn unknown_kind_is_preserved() {
    let update =
        parse_session_update(json!({ "sessionUpdate": "current_mode_update" })).expect("decode");
    assert_eq!(
        update,
        SessionUpdate::Unknown {
            kind: "current_mode_update".into()
        }
    );
}

/// The discriminator is required.
#[test]
fn missing_discriminator_is_error() {
    assert!(parse_session_update(json!({ "content": {} })).is_err());
}

// ── Tool call content ───────────────────────────────────────────────────────

/// Diff, text, and unknown content items map to their variants.
#[test]
fn content_items_map_to_variants() {
    let diff = content_from_wire(json!({
        "type": "diff", "path": "src/lib.rs", "oldText": "a", "newText": "b"
    }));
    assert_eq!(
        diff,
        ToolCallContent::Diff {
            path: "src/lib.rs".into(),
            old_text: Some("a".into()),
            new_text: "b".into(),
        }
    );

    let text = content_from_wire(json!({
        "type": "content", "content": { "type": "text", "text": "ok" }
    }));
    assert_eq!(text, ToolCallContent::Text { text: "ok".into() });

    let raw = json!({ "type": "terminal", "terminalId": "t1" });
    assert_eq!(
        content_from_wire(raw.clone()),
        ToolCallContent::Other { raw },
        "unknown content is kept verbatim"
    );
}

// ── Permission requests ─────────────────────────────────────────────────────

/// Permission params decode into a request with its options.
#[test]
fn permission_request_decodes_options() {
    let request = parse_permission_request(json!({
        "sessionId": "s1",
        "toolCall": {
            "toolCallId": "call-9",
            "title": "Edit file",
            "rawInput": { "description": "Modify src/main.rs" }
        },
        "options": [
            { "optionId": "allow", "name": "Allow", "kind": "allow_once" },
            { "optionId": "always", "name": "Always", "kind": "allow_always" },
            { "optionId": "reject", "name": "Reject", "kind": "reject_once" },
            { "optionId": "odd", "name": "Odd", "kind": "something_new" }
        ]
    }))
    .expect("decode");

    assert_eq!(request.call_id, "call-9");
    assert_eq!(request.title, "Edit file");
    assert_eq!(request.description.as_deref(), Some("Modify src/main.rs"));
    assert_eq!(request.options.len(), 4);
    assert_eq!(request.options[3].kind, PermissionOptionKind::Unknown);
    assert_eq!(
        request.first_allow_option().map(|o| o.option_id.as_str()),
        Some("allow")
    );
}

/// A request without a tool call id is rejected.
#[test]
fn permission_request_requires_call_id() {
    let err = parse_permission_request(json!({ "toolCall": { "title": "x" }, "options": [] }))
        .expect_err("toolCallId is required");
    assert!(matches!(err, AppError::Acp(_)));
}

// ── Prompt blocks ───────────────────────────────────────────────────────────

/// Attached files follow the text block as resource links.
#[test]
fn prompt_blocks_append_resource_links() {
    let files = vec![PathBuf::from("/repo/main/README.md")];
    let blocks = prompt_blocks("read this", &files);

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], json!({ "type": "text", "text": "read this" }));
    assert_eq!(
        blocks[1],
        json!({
            "type": "resource_link",
            "uri": "file:///repo/main/README.md",
            "name": "README.md"
        })
    );
}
