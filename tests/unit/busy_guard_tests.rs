//! Unit tests for per-conversation busy flags.

use std::time::Duration;

use agent_conductor::orchestrator::busy_guard::BusyGuard;

/// Flags are per conversation and idempotent.
#[test]
fn flags_are_per_conversation() {
    let guard = BusyGuard::new();
    guard.set_processing("a", true);
    guard.set_processing("a", true);
    guard.set_processing("b", true);

    assert!(guard.is_processing("a"));
    assert_eq!(guard.busy_count(), 2);

    guard.set_processing("a", false);
    assert!(!guard.is_processing("a"));
    assert!(guard.is_processing("b"));
    assert_eq!(guard.busy_count(), 1);
}

/// Clones share the same flags.
#[test]
fn clones_share_state() {
    let guard = BusyGuard::new();
    let other = guard.clone();
    other.set_processing("a", true);
    assert!(guard.is_processing("a"));
}

/// Waiting on an idle conversation returns at once.
#[tokio::test]
async fn idle_conversation_returns_immediately() {
    let guard = BusyGuard::new();
    assert!(guard.wait_for_idle("a", Duration::from_millis(10)).await);
}

/// A waiter wakes when the flag is cleared.
#[tokio::test(start_paused = true)]
async fn waiter_wakes_on_clear() {
    let guard = BusyGuard::new();
    guard.set_processing("a", true);

    let clearer = guard.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        clearer.set_processing("a", false);
    });

    assert!(guard.wait_for_idle("a", Duration::from_secs(10)).await);
}

/// A waiter gives up after the timeout.
#[tokio::test(start_paused = true)]
async fn waiter_times_out() {
    let guard = BusyGuard::new();
    guard.set_processing("a", true);
    assert!(!guard.wait_for_idle("a", Duration::from_secs(5)).await);
}
