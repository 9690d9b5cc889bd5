//! Chat routes — public (quota-gated) and authenticated chat, plus history.
//!
//! SYSTEM CONTEXT
//! ==============
//! Anonymous callers go through the rate limiter: the request slot is
//! reserved before the LLM call and only counted once a reply came back.
//! Authenticated callers skip quotas; their turns are also written to the
//! chat history under the same `session_id` as the document session.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::auth::AuthUser;
use super::form::{FormData, PathParam, QueryParams};
use crate::error::ApiError;
use crate::rate_limit::{ClientIp, QuotaKind};
use crate::services::history;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

// =============================================================================
// CHAT
// =============================================================================

/// `POST /chat/public` — anonymous chat, one request slot per call.
pub async fn chat_public(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let permit = state.rate_limiter.check(&ip, QuotaKind::Request)?;
    let orchestrator = state.orchestrator()?;
    let message = form.required("message")?;

    let outcome = orchestrator.chat(message, form.session_id(), None).await?;

    let remaining = permit.remaining_after();
    permit.increment();
    tracing::info!(%ip, remaining, has_document_context = outcome.has_document_context, "public chat");

    let mut body = json!({
        "response": outcome.response,
        "has_document_context": outcome.has_document_context,
        "rate_limit": {
            "remaining_requests": remaining,
            "message": format!("{remaining} requests remaining before sign-in required."),
        },
    });
    if let Some(session_id) = outcome.session_id {
        body["session_id"] = json!(session_id);
    }
    Ok(Json(body))
}

/// `POST /chat` — authenticated chat, persisted to history.
///
/// A `session_id` the caller does not own starts a new conversation.
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let orchestrator = state.orchestrator()?;
    let message = form.required("message")?;
    let user_id = auth.user.id;

    let resolved = history::resolve_session(&state.pool, form.session_id(), user_id).await?;
    let outcome = orchestrator.chat(message, Some(resolved.session_id), Some(user_id)).await?;

    history::record_chat_turn(
        &state.pool,
        &resolved,
        user_id,
        message,
        &outcome.response,
        outcome.has_document_context,
    )
    .await?;

    Ok(Json(json!({
        "response": outcome.response,
        "session_id": resolved.session_id,
        "has_document_context": outcome.has_document_context,
    })))
}

// =============================================================================
// HISTORY
// =============================================================================

#[derive(Deserialize)]
pub struct Page {
    skip: Option<i64>,
    limit: Option<i64>,
}

/// `GET /chat/history` — caller's conversations, newest activity first.
pub async fn list_history(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Query(page), _): QueryParams<Page>,
) -> Result<Json<Value>, ApiError> {
    let (sessions, total) = history::list_sessions(
        &state.pool,
        auth.user.id,
        page.skip.unwrap_or(0),
        page.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
    )
    .await?;
    Ok(Json(json!({ "chat_sessions": sessions, "total_count": total })))
}

/// `GET /chat/history/{session_id}`
pub async fn get_history(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(session_id), _): PathParam<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let messages = history::session_messages(&state.pool, session_id, auth.user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat session not found".into()))?;
    Ok(Json(json!({ "messages": messages })))
}

/// `DELETE /chat/history/{session_id}`
pub async fn delete_history(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(session_id), _): PathParam<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !history::delete_session(&state.pool, session_id, auth.user.id).await? {
        return Err(ApiError::NotFound("Chat session not found".into()));
    }
    Ok(Json(json!({ "success": true, "message": "Chat session deleted successfully" })))
}

/// `DELETE /chat/history`
pub async fn clear_history(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Value>, ApiError> {
    let deleted = history::delete_all(&state.pool, auth.user.id).await?;
    let message = if deleted > 0 { "All chat history cleared successfully" } else { "No chat history to clear" };
    Ok(Json(json!({ "success": true, "message": message })))
}

/// `PUT /chat/history/{session_id}/title` — accepts a JSON or form body.
pub async fn rename_history(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(session_id), _): PathParam<Uuid>,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let title = form.required("title")?;
    if !history::rename(&state.pool, session_id, auth.user.id, title).await? {
        return Err(ApiError::NotFound("Chat session not found".into()));
    }
    Ok(Json(json!({ "success": true, "message": "Title updated successfully" })))
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
