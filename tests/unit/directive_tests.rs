//! Unit tests for scheduling directive parsing and the in-memory registry.

use std::time::Duration;

use agent_conductor::orchestrator::busy_guard::BusyGuard;
use agent_conductor::orchestrator::directives::{
    has_directives, is_valid_schedule, parse_directives, CronRegistry, CronSpec, Directive,
    DirectiveExecutor,
};

const CREATE: &str = "\
Sure, I'll set that up.
[CRON_CREATE]
name: Daily summary
schedule: 0 9 * * *
schedule_description: Every day at 09:00
message: Summarize yesterday's commits
and open issues.
[/CRON_CREATE]";

// ── Parsing ─────────────────────────────────────────────────────────────────

/// A create block yields its fields; the message runs to the closing tag.
#[test]
fn parses_create_block() {
    let directives = parse_directives(CREATE);

    assert_eq!(
        directives,
        vec![Directive::Create(CronSpec {
            name: "Daily summary".into(),
            schedule: "0 9 * * *".into(),
            schedule_description: Some("Every day at 09:00".into()),
            message: "Summarize yesterday's commits\nand open issues.".into(),
        })]
    );
}

/// Directives are returned in order of appearance.
#[test]
fn directives_keep_text_order() {
    let text = format!("[CRON_DELETE: job-1]\n{CREATE}\n[CRON_LIST]");
    let directives = parse_directives(&text);

    assert_eq!(directives.len(), 3);
    assert_eq!(directives[0], Directive::Delete { id: "job-1".into() });
    assert!(matches!(directives[1], Directive::Create(_)));
    assert_eq!(directives[2], Directive::List);
}

/// A create block without a schedule is malformed.
#[test]
fn create_without_schedule_is_malformed() {
    let directives = parse_directives("[CRON_CREATE]\nname: x\nmessage: y\n[/CRON_CREATE]");
    assert!(matches!(directives.as_slice(), [Directive::Malformed { .. }]));
}

/// A delete without an id is malformed.
#[test]
fn delete_without_id_is_malformed() {
    let directives = parse_directives("[CRON_DELETE:   ]");
    assert_eq!(
        directives,
        vec![Directive::Malformed {
            reason: "CRON_DELETE requires a job id".into()
        }]
    );
}

/// Plain text has no directives.
#[test]
fn plain_text_has_no_directives() {
    assert!(!has_directives("I scheduled nothing. CRON_LIST without brackets."));
    assert!(has_directives("[CRON_LIST]"));
}

/// Schedules accept cron fields and macros only.
#[test]
fn schedule_validation() {
    assert!(is_valid_schedule("*/5 * * * *"));
    assert!(is_valid_schedule("0 0 9 * * 1-5"));
    assert!(is_valid_schedule("@daily"));
    assert!(!is_valid_schedule("@sometimes"));
    assert!(!is_valid_schedule("every morning"));
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Create, list, and delete through the executor.
#[tokio::test]
async fn create_list_delete_round() {
    let registry = CronRegistry::new();
    let [create] = <[Directive; 1]>::try_from(parse_directives(CREATE)).expect("one directive");

    let reply = registry.execute("conv-1", &create).await;
    assert!(reply.starts_with("Scheduled task created: Daily summary (id: "), "got: {reply}");

    let jobs = registry.jobs_for("conv-1");
    assert_eq!(jobs.len(), 1);
    let id = jobs[0].id.clone();

    let listing = registry.execute("conv-1", &Directive::List).await;
    assert_eq!(
        listing,
        format!("Scheduled tasks:\n- {id}: Daily summary (Every day at 09:00)")
    );

    let deleted = registry
        .execute("conv-1", &Directive::Delete { id: id.clone() })
        .await;
    assert_eq!(deleted, format!("Scheduled task {id} deleted."));
    assert_eq!(registry.execute("conv-1", &Directive::List).await, "No scheduled tasks.");
}

/// Jobs are scoped to their conversation.
#[tokio::test]
async fn other_conversation_cannot_delete() {
    let registry = CronRegistry::new();
    let [create] = <[Directive; 1]>::try_from(parse_directives(CREATE)).expect("one directive");
    registry.execute("conv-1", &create).await;
    let id = registry.jobs_for("conv-1")[0].id.clone();

    let reply = registry
        .execute("conv-2", &Directive::Delete { id: id.clone() })
        .await;
    assert_eq!(reply, format!("Error: no scheduled task with id {id}"));
    assert!(registry.get(&id).is_some(), "job must survive");
    assert_eq!(registry.execute("conv-2", &Directive::List).await, "No scheduled tasks.");
}

/// Invalid schedules and malformed directives report errors.
#[tokio::test]
async fn errors_are_reported_as_text() {
    let registry = CronRegistry::new();
    let bad = Directive::Create(CronSpec {
        name: "x".into(),
        schedule: "whenever".into(),
        schedule_description: None,
        message: "y".into(),
    });

    assert_eq!(
        registry.execute("c", &bad).await,
        "Error: invalid schedule 'whenever'"
    );
    assert_eq!(
        registry
            .execute(
                "c",
                &Directive::Malformed {
                    reason: "broken".into()
                }
            )
            .await,
        "Error: broken"
    );
    assert!(registry.jobs_for("c").is_empty());
}

/// A job fires only once its conversation is idle.
#[tokio::test(start_paused = true)]
async fn ready_to_fire_waits_for_idle() {
    let registry = CronRegistry::new();
    let guard = BusyGuard::new();
    let [create] = <[Directive; 1]>::try_from(parse_directives(CREATE)).expect("one directive");
    registry.execute("conv-1", &create).await;
    let id = registry.jobs_for("conv-1")[0].id.clone();

    guard.set_processing("conv-1", true);
    assert!(
        registry
            .ready_to_fire(&id, &guard, Duration::from_secs(1))
            .await
            .is_none(),
        "busy conversation defers the job"
    );

    guard.set_processing("conv-1", false);
    let job = registry
        .ready_to_fire(&id, &guard, Duration::from_secs(1))
        .await
        .expect("idle conversation fires");
    assert_eq!(job.message, "Summarize yesterday's commits\nand open issues.");
}
