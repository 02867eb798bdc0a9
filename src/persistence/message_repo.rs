//! Message repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::message::{compose, Message, MessageBody, MessagePosition};
use crate::{AppError, Result};

use super::conversation_repo::parse_timestamp;
use super::db::Database;

/// Repository for message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    msg_id: String,
    conversation_id: String,
    position: String,
    body: String,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let position = parse_position(&self.position)?;
        let body: MessageBody = serde_json::from_str(&self.body)
            .map_err(|e| AppError::Db(format!("invalid body for message {}: {e}", self.id)))?;

        Ok(Message {
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            id: self.id,
            msg_id: self.msg_id,
            conversation_id: self.conversation_id,
            position,
            body,
        })
    }
}

fn parse_position(s: &str) -> Result<MessagePosition> {
    match s {
        "left" => Ok(MessagePosition::Left),
        "right" => Ok(MessagePosition::Right),
        "center" => Ok(MessagePosition::Center),
        other => Err(AppError::Db(format!("invalid message position: {other}"))),
    }
}

fn position_str(p: MessagePosition) -> &'static str {
    match p {
        MessagePosition::Left => "left",
        MessagePosition::Right => "right",
        MessagePosition::Center => "center",
    }
}

const SELECT_COLUMNS: &str = "SELECT id, msg_id, conversation_id, position, body, created_at FROM message";

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a message as a new row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, message: &Message) -> Result<()> {
        let body = serde_json::to_string(&message.body)?;

        sqlx::query(
            "INSERT INTO message (id, msg_id, conversation_id, position, body_type, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&message.id)
        .bind(&message.msg_id)
        .bind(&message.conversation_id)
        .bind(position_str(message.position))
        .bind(message.body.type_name())
        .bind(&body)
        .bind(message.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Fold `message` into the latest row sharing its merge key, or append it.
    ///
    /// Text bodies concatenate; other bodies replace the stored one. Returns
    /// the stored result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the lookup or write fails.
    pub async fn add_or_update(&self, message: &Message) -> Result<Message> {
        let mut tx = self.db.begin().await?;

        let existing: Option<MessageRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE conversation_id = ?1 AND msg_id = ?2 ORDER BY seq DESC LIMIT 1"
        ))
        .bind(&message.conversation_id)
        .bind(&message.msg_id)
        .fetch_optional(&mut *tx)
        .await?;

        let stored = match existing {
            Some(row) => {
                let mut list = vec![row.into_message()?];
                compose(&mut list, message.clone());
                let merged = list
                    .pop()
                    .ok_or_else(|| AppError::Db("message composition lost its row".into()))?;

                sqlx::query("UPDATE message SET body_type = ?1, body = ?2 WHERE id = ?3")
                    .bind(merged.body.type_name())
                    .bind(serde_json::to_string(&merged.body)?)
                    .bind(&merged.id)
                    .execute(&mut *tx)
                    .await?;
                merged
            }
            None => {
                sqlx::query(
                    "INSERT INTO message (id, msg_id, conversation_id, position, body_type, body, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .bind(&message.id)
                .bind(&message.msg_id)
                .bind(&message.conversation_id)
                .bind(position_str(message.position))
                .bind(message.body.type_name())
                .bind(serde_json::to_string(&message.body)?)
                .bind(message.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
                message.clone()
            }
        };

        tx.commit().await?;
        Ok(stored)
    }

    /// Every message of a conversation in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE conversation_id = ?1 ORDER BY seq ASC"))
                .bind(conversation_id)
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}
