//! Advisory per-conversation "agent is working" flags.
//!
//! Background jobs check the guard before injecting a message so they never
//! interleave with a turn in progress.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

/// Shared busy flags keyed by conversation id.
#[derive(Debug, Clone)]
pub struct BusyGuard {
    busy: watch::Sender<HashSet<String>>,
}

impl Default for BusyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl BusyGuard {
    /// Guard with no busy conversation.
    #[must_use]
    pub fn new() -> Self {
        let (busy, _) = watch::channel(HashSet::new());
        Self { busy }
    }

    /// Mark `conversation_id` busy or idle.
    pub fn set_processing(&self, conversation_id: &str, processing: bool) {
        self.busy.send_if_modified(|set| {
            if processing {
                set.insert(conversation_id.to_owned())
            } else {
                set.remove(conversation_id)
            }
        });
        debug!(conversation_id, processing, "busy flag updated");
    }

    /// Whether `conversation_id` is busy.
    #[must_use]
    pub fn is_processing(&self, conversation_id: &str) -> bool {
        self.busy.borrow().contains(conversation_id)
    }

    /// Number of busy conversations.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.busy.borrow().len()
    }

    /// Wait until `conversation_id` is idle; `false` if `timeout` passes first.
    pub async fn wait_for_idle(&self, conversation_id: &str, timeout: Duration) -> bool {
        let mut rx = self.busy.subscribe();
        let idle = rx.wait_for(|set| !set.contains(conversation_id));
        let reached = matches!(tokio::time::timeout(timeout, idle).await, Ok(Ok(_)));
        reached
    }
}
