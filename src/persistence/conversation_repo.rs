//! Conversation repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::conversation::{Conversation, ConversationExtra};
use crate::models::engine::EngineKind;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for conversation records.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    workspace: String,
    engine: String,
    extra: String,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation> {
        let engine = EngineKind::from_id(&self.engine)
            .ok_or_else(|| AppError::Db(format!("invalid engine: {}", self.engine)))?;
        let extra: ConversationExtra = serde_json::from_str(&self.extra)
            .map_err(|e| AppError::Db(format!("invalid extra for {}: {e}", self.id)))?;

        Ok(Conversation {
            id: self.id,
            workspace: self.workspace.into(),
            engine,
            extra,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
        })
    }
}

pub(super) fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a conversation record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails (including a duplicate id).
    pub async fn create(&self, conversation: &Conversation) -> Result<Conversation> {
        let extra = serde_json::to_string(&conversation.extra)?;

        sqlx::query(
            "INSERT INTO conversation (id, workspace, engine, extra, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&conversation.id)
        .bind(conversation.workspace.to_string_lossy().as_ref())
        .bind(conversation.engine.id())
        .bind(&extra)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(conversation.clone())
    }

    /// Fetch a conversation by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is malformed.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, workspace, engine, extra, created_at, updated_at
             FROM conversation WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ConversationRow::into_conversation).transpose()
    }

    /// Shallow-merge `patch` into the stored extra blob.
    ///
    /// Keys present in `patch` overwrite stored keys; a `null` value clears
    /// an optional field. Returns the updated conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the conversation does not exist, or
    /// `AppError::Db` if the merged blob is not a valid extra record.
    pub async fn merge_extra(&self, id: &str, patch: Map<String, Value>) -> Result<Conversation> {
        let mut tx = self.db.begin().await?;

        let stored: Option<(String,)> =
            sqlx::query_as("SELECT extra FROM conversation WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (raw,) = stored.ok_or_else(|| AppError::NotFound(format!("conversation {id}")))?;

        let mut merged = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        merged.extend(patch);
        let merged = Value::Object(merged);

        let extra: ConversationExtra = serde_json::from_value(merged)
            .map_err(|e| AppError::Db(format!("invalid extra patch for {id}: {e}")))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE conversation SET extra = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(serde_json::to_string(&extra)?)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {id}")))
    }
}
