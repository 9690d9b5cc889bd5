//! Durable chat history — conversations and their messages.
//!
//! SYSTEM CONTEXT
//! ==============
//! The in-memory document session and the persisted conversation share the
//! same `session_id` but are updated independently: the cache feeds LLM
//! context, this table feeds history browsing.
//!
//! Turns are written after the LLM has answered, in one transaction, so a
//! failed call never leaves a dangling user message or an empty conversation.

use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::conversation::truncate_with_ellipsis;

const PREVIEW_MAX_CHARS: usize = 100;
const DEFAULT_TITLE: &str = "New Chat";
const EMPTY_PREVIEW: &str = "No messages";

const TS: &str = r#"'YYYY-MM-DD"T"HH24:MI:SS"Z"'"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Ai,
}

impl MessageType {
    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

/// Conversation the chat route will write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session_id: Uuid,
    /// Row id and title when the caller already owns this conversation.
    pub existing: Option<(i64, Option<String>)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: i64,
    pub session_id: Uuid,
    pub title: String,
    pub preview: String,
    pub message_count: i64,
    pub has_document_context: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub has_document_context: bool,
    pub created_at: String,
}

/// Document analysis metadata stored on the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord<'a> {
    pub title: &'a str,
    pub document_info: serde_json::Value,
}

#[must_use]
pub fn preview(first_message: Option<&str>) -> String {
    first_message.map_or_else(|| EMPTY_PREVIEW.to_owned(), |m| truncate_with_ellipsis(m, PREVIEW_MAX_CHARS))
}

// =============================================================================
// WRITES
// =============================================================================

/// Reuse `requested` when the caller owns it, otherwise mint a fresh id.
/// Nothing is written until the turn is recorded.
pub async fn resolve_session(
    pool: &PgPool,
    requested: Option<Uuid>,
    user_id: i64,
) -> Result<ResolvedSession, sqlx::Error> {
    if let Some(session_id) = requested {
        let row = sqlx::query("SELECT id, title FROM chat_sessions WHERE session_id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            return Ok(ResolvedSession { session_id, existing: Some((row.get("id"), row.get("title"))) });
        }
        tracing::info!(%session_id, user_id, "unknown or foreign session id; starting a new conversation");
    }
    Ok(ResolvedSession { session_id: Uuid::new_v4(), existing: None })
}

/// Persist one user/assistant exchange. Creates the conversation if needed
/// and titles it from the first user message.
pub async fn record_chat_turn(
    pool: &PgPool,
    resolved: &ResolvedSession,
    user_id: i64,
    user_text: &str,
    ai_text: &str,
    has_document_context: bool,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let chat_id: i64 = match &resolved.existing {
        Some((id, _)) => *id,
        None => {
            sqlx::query_scalar("INSERT INTO chat_sessions (session_id, user_id) VALUES ($1, $2) RETURNING id")
                .bind(resolved.session_id)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?
        }
    };

    insert_message(&mut tx, chat_id, user_id, user_text, MessageType::User, has_document_context).await?;
    insert_message(&mut tx, chat_id, user_id, ai_text, MessageType::Ai, has_document_context).await?;

    sqlx::query(
        r"UPDATE chat_sessions
          SET title = COALESCE(title, $2),
              has_document_context = has_document_context OR $3,
              updated_at = now()
          WHERE id = $1",
    )
    .bind(chat_id)
    .bind(super::conversation::derive_title(user_text))
    .bind(has_document_context)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

/// Persist a document analysis as a new conversation with its first exchange.
pub async fn record_analysis(
    pool: &PgPool,
    session_id: Uuid,
    user_id: i64,
    prompt: &str,
    response: &str,
    record: DocumentRecord<'_>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let chat_id: i64 = sqlx::query_scalar(
        r"INSERT INTO chat_sessions (session_id, user_id, title, has_document_context, document_info)
          VALUES ($1, $2, $3, TRUE, $4)
          RETURNING id",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(record.title)
    .bind(record.document_info)
    .fetch_one(&mut *tx)
    .await?;

    insert_message(&mut tx, chat_id, user_id, prompt, MessageType::User, true).await?;
    insert_message(&mut tx, chat_id, user_id, response, MessageType::Ai, true).await?;

    tx.commit().await
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    chat_id: i64,
    user_id: i64,
    content: &str,
    kind: MessageType,
    has_document_context: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"INSERT INTO messages (chat_session_id, user_id, content, message_type, has_document_context)
          VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(content)
    .bind(kind.as_str())
    .bind(has_document_context)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// READS / MANAGEMENT
// =============================================================================

/// Page of the caller's conversations, most recently updated first, plus the
/// total count.
pub async fn list_sessions(
    pool: &PgPool,
    user_id: i64,
    skip: i64,
    limit: i64,
) -> Result<(Vec<ChatSummary>, i64), sqlx::Error> {
    let sql = format!(
        r"SELECT c.id, c.session_id, c.title, c.has_document_context,
                 to_char(c.created_at AT TIME ZONE 'UTC', {TS}) AS created_at,
                 to_char(c.updated_at AT TIME ZONE 'UTC', {TS}) AS updated_at,
                 (SELECT count(*) FROM messages m WHERE m.chat_session_id = c.id) AS message_count,
                 (SELECT m.content FROM messages m WHERE m.chat_session_id = c.id
                  ORDER BY m.created_at, m.id LIMIT 1) AS first_message
          FROM chat_sessions c
          WHERE c.user_id = $1
          ORDER BY c.updated_at DESC
          OFFSET $2 LIMIT $3"
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(skip.max(0))
        .bind(limit.clamp(1, 200))
        .fetch_all(pool)
        .await?;

    let total: i64 = sqlx::query_scalar("SELECT count(*) FROM chat_sessions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let sessions = rows
        .into_iter()
        .map(|r| {
            let first: Option<String> = r.get("first_message");
            let title: Option<String> = r.get("title");
            ChatSummary {
                id: r.get("id"),
                session_id: r.get("session_id"),
                title: title.unwrap_or_else(|| DEFAULT_TITLE.to_owned()),
                preview: preview(first.as_deref()),
                message_count: r.get("message_count"),
                has_document_context: r.get("has_document_context"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            }
        })
        .collect();

    Ok((sessions, total))
}

/// Messages of one conversation in order. `None` when the caller does not
/// own it.
pub async fn session_messages(
    pool: &PgPool,
    session_id: Uuid,
    user_id: i64,
) -> Result<Option<Vec<StoredMessage>>, sqlx::Error> {
    let owned: Option<i64> = sqlx::query_scalar("SELECT id FROM chat_sessions WHERE session_id = $1 AND user_id = $2")
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let Some(chat_id) = owned else {
        return Ok(None);
    };

    let sql = format!(
        r"SELECT id, content, message_type, has_document_context,
                 to_char(created_at AT TIME ZONE 'UTC', {TS}) AS created_at
          FROM messages
          WHERE chat_session_id = $1
          ORDER BY created_at, id"
    );
    let rows = sqlx::query(&sql).bind(chat_id).fetch_all(pool).await?;

    Ok(Some(
        rows.into_iter()
            .map(|r| {
                let kind: String = r.get("message_type");
                StoredMessage {
                    id: r.get("id"),
                    content: r.get("content"),
                    message_type: if kind == "ai" { MessageType::Ai } else { MessageType::User },
                    has_document_context: r.get("has_document_context"),
                    created_at: r.get("created_at"),
                }
            })
            .collect(),
    ))
}

/// Returns false when nothing matched.
pub async fn delete_session(pool: &PgPool, session_id: Uuid, user_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM chat_sessions WHERE session_id = $1 AND user_id = $2")
        .bind(session_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_all(pool: &PgPool, user_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM chat_sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Returns false when nothing matched.
pub async fn rename(pool: &PgPool, session_id: Uuid, user_id: i64, title: &str) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE chat_sessions SET title = $3, updated_at = now() WHERE session_id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .bind(title)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
