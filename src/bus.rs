//! Presentation bus: outbound events for whatever renders the conversation.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::message::Message;
use crate::models::permission::Confirmation;

/// Capacity of the broadcast channel.
pub const EVENT_BUFFER_SIZE: usize = 256;

/// One event forwarded to the presentation layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEvent {
    /// A normalized agent message; consumers collapse by `msg_id`.
    Message {
        /// The message.
        message: Message,
    },
    /// Result of a directive or other system action.
    System {
        /// Owning conversation.
        conversation_id: String,
        /// Merge key.
        msg_id: String,
        /// Notice text.
        content: String,
    },
    /// Echo of what the user sent, original content.
    UserContent {
        /// Owning conversation.
        conversation_id: String,
        /// Merge key of the user message.
        msg_id: String,
        /// Content as typed.
        content: String,
    },
    /// A send or session failure.
    Error {
        /// Owning conversation.
        conversation_id: String,
        /// Merge key.
        msg_id: String,
        /// Rendered error.
        content: String,
    },
    /// A permission request waiting for the user.
    Confirmation {
        /// Pending confirmation.
        confirmation: Confirmation,
    },
    /// A pending confirmation was answered or withdrawn.
    ConfirmationResolved {
        /// Owning conversation.
        conversation_id: String,
        /// Call id of the confirmation.
        call_id: String,
    },
    /// The agent finished its turn.
    Finish {
        /// Owning conversation.
        conversation_id: String,
        /// Stop reason reported by the agent.
        stop_reason: String,
    },
}

impl ResponseEvent {
    /// Conversation the event belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Message { message } => &message.conversation_id,
            Self::Confirmation { confirmation } => &confirmation.conversation_id,
            Self::System {
                conversation_id, ..
            }
            | Self::UserContent {
                conversation_id, ..
            }
            | Self::Error {
                conversation_id, ..
            }
            | Self::ConfirmationResolved {
                conversation_id, ..
            }
            | Self::Finish {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Sink for presentation events.
pub trait PresentationBus: Send + Sync {
    /// Emit one event; delivery is best effort.
    fn emit(&self, event: ResponseEvent);
}

/// [`PresentationBus`] fanning out over a `tokio` broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<ResponseEvent>,
}

impl BroadcastBus {
    /// Bus with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER_SIZE)
    }

    /// Bus holding up to `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResponseEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationBus for BroadcastBus {
    fn emit(&self, event: ResponseEvent) {
        if self.tx.send(event).is_err() {
            trace!("presentation event dropped, no subscribers");
        }
    }
}
