//! Unit tests for domain models: message composition, tool call merging,
//! engine ids, and conversation extra serialization.

use serde_json::json;

use agent_conductor::models::conversation::{Conversation, ConversationExtra};
use agent_conductor::models::engine::EngineKind;
use agent_conductor::models::message::{compose, Message, MessageBody, MessagePosition, TipKind};
use agent_conductor::models::tool_call::{
    ToolCall, ToolCallContent, ToolCallPatch, ToolCallStatus, ToolKind,
};

fn call(call_id: &str, status: ToolCallStatus) -> ToolCall {
    ToolCall::from_patch(ToolCallPatch {
        call_id: call_id.into(),
        title: Some(format!("call {call_id}")),
        status: Some(status),
        ..ToolCallPatch::default()
    })
}

// ── compose ─────────────────────────────────────────────────────────────────

/// Text with the same merge key concatenates.
#[test]
fn compose_concatenates_text() {
    let mut list = Vec::new();
    compose(&mut list, Message::text("c1", "m1", MessagePosition::Left, "Hello, "));
    compose(&mut list, Message::text("c1", "m1", MessagePosition::Left, "world"));

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].text_content(), Some("Hello, world"));
}

/// Different merge keys or conversations append.
#[test]
fn compose_appends_on_new_key_or_conversation() {
    let mut list = Vec::new();
    compose(&mut list, Message::text("c1", "m1", MessagePosition::Left, "a"));
    compose(&mut list, Message::text("c1", "m2", MessagePosition::Left, "b"));
    compose(&mut list, Message::text("c2", "m1", MessagePosition::Left, "c"));

    assert_eq!(list.len(), 3);
}

/// Non-text bodies replace the existing entry.
#[test]
fn compose_replaces_tool_call_body() {
    let mut list = Vec::new();
    let first = Message::new(
        "c1",
        "call-1",
        MessagePosition::Left,
        MessageBody::ToolCall(call("call-1", ToolCallStatus::Pending)),
    );
    let second = Message::new(
        "c1",
        "call-1",
        MessagePosition::Left,
        MessageBody::ToolCall(call("call-1", ToolCallStatus::Completed)),
    );
    compose(&mut list, first);
    compose(&mut list, second);

    assert_eq!(list.len(), 1);
    let MessageBody::ToolCall(merged) = &list[0].body else {
        panic!("expected a tool call body");
    };
    assert_eq!(merged.status, ToolCallStatus::Completed);
}

/// Tool groups merge member by member.
#[test]
fn compose_merges_tool_groups_by_call_id() {
    let mut list = Vec::new();
    compose(
        &mut list,
        Message::new(
            "c1",
            "g1",
            MessagePosition::Left,
            MessageBody::ToolGroup(vec![
                call("a", ToolCallStatus::Pending),
                call("b", ToolCallStatus::Pending),
            ]),
        ),
    );
    compose(
        &mut list,
        Message::new(
            "c1",
            "g1",
            MessagePosition::Left,
            MessageBody::ToolGroup(vec![
                call("b", ToolCallStatus::Completed),
                call("c", ToolCallStatus::Pending),
            ]),
        ),
    );

    let MessageBody::ToolGroup(calls) = &list[0].body else {
        panic!("expected a tool group");
    };
    let summary: Vec<(&str, ToolCallStatus)> =
        calls.iter().map(|c| (c.call_id.as_str(), c.status)).collect();
    assert_eq!(
        summary,
        vec![
            ("a", ToolCallStatus::Pending),
            ("b", ToolCallStatus::Completed),
            ("c", ToolCallStatus::Pending),
        ]
    );
}

// ── Tool call merging ───────────────────────────────────────────────────────

/// Absent patch fields never clobber present ones.
#[test]
fn apply_keeps_fields_absent_from_patch() {
    let mut record = ToolCall::from_patch(ToolCallPatch {
        call_id: "x".into(),
        title: Some("Edit".into()),
        kind: Some(ToolKind::Edit),
        raw_input: Some(json!({ "path": "a.rs" })),
        content: Some(vec![ToolCallContent::Text { text: "v1".into() }]),
        ..ToolCallPatch::default()
    });

    record.apply(ToolCallPatch {
        call_id: "x".into(),
        status: Some(ToolCallStatus::InProgress),
        ..ToolCallPatch::default()
    });

    assert_eq!(record.title, "Edit");
    assert_eq!(record.kind, ToolKind::Edit);
    assert_eq!(record.raw_input, Some(json!({ "path": "a.rs" })));
    assert_eq!(record.content.len(), 1);
    assert_eq!(record.status, ToolCallStatus::InProgress);
}

/// A present content list replaces the previous one.
#[test]
fn apply_replaces_content_list() {
    let mut record = call("x", ToolCallStatus::InProgress);
    record.content = vec![ToolCallContent::Text { text: "old".into() }];

    record.apply(ToolCallPatch {
        call_id: "x".into(),
        content: Some(vec![ToolCallContent::Text { text: "new".into() }]),
        ..ToolCallPatch::default()
    });

    assert_eq!(record.content, vec![ToolCallContent::Text { text: "new".into() }]);
}

/// Terminal statuses do not change, even to another terminal status.
#[test]
fn terminal_status_is_final() {
    let mut record = call("x", ToolCallStatus::Failed);
    record.apply(ToolCallPatch {
        call_id: "x".into(),
        status: Some(ToolCallStatus::Completed),
        ..ToolCallPatch::default()
    });
    assert_eq!(record.status, ToolCallStatus::Failed);
}

// ── Engines and conversations ───────────────────────────────────────────────

/// Engine ids round-trip through `from_id`.
#[test]
fn engine_ids_round_trip() {
    for kind in EngineKind::ALL {
        assert_eq!(EngineKind::from_id(kind.id()), Some(kind));
    }
    assert_eq!(EngineKind::from_id("nope"), None);
    assert!(EngineKind::Custom.defaults().is_none());
    assert_eq!(
        EngineKind::Gemini.defaults().map(|d| d.acp_args),
        Some(&["--experimental-acp"][..])
    );
}

/// Unset extra fields are omitted from the stored JSON.
#[test]
fn conversation_extra_omits_unset_fields() {
    let extra = ConversationExtra::default();
    let value = serde_json::to_value(&extra).expect("serialize");
    assert_eq!(value, json!({ "overrides": {} }));
}

/// Session token helpers set and clear both fields.
#[test]
fn session_token_set_and_clear() {
    let mut conversation = Conversation::new("/repo/main", EngineKind::Claude);
    conversation.set_session_token("sess-1");
    assert_eq!(conversation.extra.acp_session_id.as_deref(), Some("sess-1"));
    assert!(conversation.extra.acp_session_updated_at.is_some());

    conversation.clear_session_token();
    assert!(conversation.extra.acp_session_id.is_none());
    assert!(conversation.extra.acp_session_updated_at.is_none());
}

/// Tips messages render centered with their kind.
#[test]
fn tips_message_is_centered() {
    let message = Message::tips("c1", "m1", TipKind::Error, "boom");
    assert_eq!(message.position, MessagePosition::Center);
    assert_eq!(message.body.type_name(), "tips");
}
