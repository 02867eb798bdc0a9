//! `SQLite` schema bootstrap logic.
//!
//! Every definition uses `IF NOT EXISTS`, so bootstrap runs on each start.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the conversation and message tables.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS conversation (
    id              TEXT PRIMARY KEY NOT NULL,
    workspace       TEXT NOT NULL,
    engine          TEXT NOT NULL,
    extra           TEXT NOT NULL DEFAULT '{}',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL UNIQUE,
    msg_id          TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    position        TEXT NOT NULL CHECK(position IN ('left','right','center')),
    body_type       TEXT NOT NULL,
    body            TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_message_conversation ON message(conversation_id, seq);
CREATE INDEX IF NOT EXISTS idx_message_merge_key ON message(conversation_id, msg_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
