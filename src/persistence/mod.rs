//! Persistence layer: the storage boundary and its `SQLite` implementation.

pub mod conversation_repo;
pub mod db;
pub mod message_repo;
pub mod schema;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::Result;

use conversation_repo::ConversationRepo;
use db::Database;
use message_repo::MessageRepo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Boxed future returned by [`ConversationStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Where conversations and their message history live.
pub trait ConversationStore: Send + Sync {
    /// Persist a new conversation.
    fn create_conversation<'a>(&'a self, conversation: &'a Conversation) -> StoreFuture<'a, ()>;

    /// Load a conversation, `None` if unknown.
    fn get_conversation<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Conversation>>;

    /// Shallow-merge `patch` into the conversation's extra record.
    fn merge_extra<'a>(
        &'a self,
        id: &'a str,
        patch: Map<String, Value>,
    ) -> StoreFuture<'a, Conversation>;

    /// Append a message unconditionally.
    fn add_message<'a>(&'a self, message: &'a Message) -> StoreFuture<'a, ()>;

    /// Fold a message into the entry sharing its merge key, or append it.
    fn add_or_update_message<'a>(&'a self, message: &'a Message) -> StoreFuture<'a, Message>;

    /// Messages of a conversation in arrival order.
    fn list_messages<'a>(&'a self, conversation_id: &'a str) -> StoreFuture<'a, Vec<Message>>;
}

/// [`ConversationStore`] backed by a `SQLite` pool.
#[derive(Clone)]
pub struct SqliteStore {
    conversations: ConversationRepo,
    messages: MessageRepo,
}

impl SqliteStore {
    /// Store over an already bootstrapped pool.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            conversations: ConversationRepo::new(Arc::clone(&db)),
            messages: MessageRepo::new(db),
        }
    }
}

impl ConversationStore for SqliteStore {
    fn create_conversation<'a>(&'a self, conversation: &'a Conversation) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.conversations.create(conversation).await?;
            Ok(())
        })
    }

    fn get_conversation<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Conversation>> {
        Box::pin(self.conversations.get_by_id(id))
    }

    fn merge_extra<'a>(
        &'a self,
        id: &'a str,
        patch: Map<String, Value>,
    ) -> StoreFuture<'a, Conversation> {
        Box::pin(self.conversations.merge_extra(id, patch))
    }

    fn add_message<'a>(&'a self, message: &'a Message) -> StoreFuture<'a, ()> {
        Box::pin(self.messages.insert(message))
    }

    fn add_or_update_message<'a>(&'a self, message: &'a Message) -> StoreFuture<'a, Message> {
        Box::pin(self.messages.add_or_update(message))
    }

    fn list_messages<'a>(&'a self, conversation_id: &'a str) -> StoreFuture<'a, Vec<Message>> {
        Box::pin(self.messages.list_for_conversation(conversation_id))
    }
}
