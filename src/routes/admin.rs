//! Admin routes — user management, usage counts, secure folder upkeep.
//!
//! Every handler takes [`AdminUser`], so non-admins get 403 before any work.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};

use super::auth::AdminUser;
use super::form::{FormData, JsonBody, PathParam, QueryParams};
use crate::error::ApiError;
use crate::services::{admin, secure_folder};
use crate::state::AppState;

const DEFAULT_USER_LIMIT: i64 = 100;
const DEFAULT_SEARCH_LIMIT: i64 = 50;
const DEFAULT_ACTIVITY_DAYS: i32 = 30;

#[derive(Deserialize)]
pub struct Page {
    skip: Option<i64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    role: Option<String>,
    status: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct ActivityParams {
    days: Option<i32>,
}

#[derive(Deserialize)]
pub struct RoleBody {
    role: String,
}

#[derive(Deserialize)]
pub struct StatusBody {
    is_active: bool,
}

#[derive(Deserialize)]
pub struct PasswordBody {
    new_password: String,
}

#[derive(Deserialize)]
pub struct GrantBody {
    user_id: i64,
    has_access: bool,
}

#[derive(Deserialize)]
pub struct DeleteFileBody {
    filename: String,
    /// Display label sent by the admin panel; all files share one directory.
    folder_name: Option<String>,
}

// =============================================================================
// USERS
// =============================================================================

/// `GET /admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Query(page), _): QueryParams<Page>,
) -> Result<Json<Value>, ApiError> {
    let users =
        admin::list_users(&state.pool, page.skip.unwrap_or(0), page.limit.unwrap_or(DEFAULT_USER_LIMIT)).await?;
    Ok(Json(json!(users)))
}

/// `GET /admin/users/search?q&role&status&limit`
pub async fn search_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Query(params), _): QueryParams<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let search = admin::UserSearch {
        q: params.q,
        role: params.role,
        status: params.status,
        limit: params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    };
    let users = admin::search_users(&state.pool, &search).await?;
    Ok(Json(json!(users)))
}

/// `GET /admin/users/{id}/activity?days`
pub async fn user_activity(
    State(state): State<AppState>,
    _admin: AdminUser,
    WithRejection(Path(user_id), _): PathParam<i64>,
    WithRejection(Query(params), _): QueryParams<ActivityParams>,
) -> Result<Json<admin::UserActivity>, ApiError> {
    let activity = admin::user_activity(&state.pool, user_id, params.days.unwrap_or(DEFAULT_ACTIVITY_DAYS)).await?;
    Ok(Json(activity))
}

/// `PUT /admin/users/{id}/role`
pub async fn update_role(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    WithRejection(Path(user_id), _): PathParam<i64>,
    WithRejection(Json(body), _): JsonBody<RoleBody>,
) -> Result<Json<Value>, ApiError> {
    admin::update_role(&state.pool, &acting, user_id, &body.role).await?;
    Ok(Json(json!({ "success": true, "message": format!("User role updated to {}", body.role) })))
}

/// `PUT /admin/users/{id}/status`
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    WithRejection(Path(user_id), _): PathParam<i64>,
    WithRejection(Json(body), _): JsonBody<StatusBody>,
) -> Result<Json<Value>, ApiError> {
    admin::update_status(&state.pool, &acting, user_id, body.is_active).await?;
    let verb = if body.is_active { "activated" } else { "suspended" };
    Ok(Json(json!({ "success": true, "message": format!("User {verb} successfully") })))
}

/// `POST /admin/users/{id}/reset-password`
pub async fn reset_password(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    WithRejection(Path(user_id), _): PathParam<i64>,
    WithRejection(Json(body), _): JsonBody<PasswordBody>,
) -> Result<Json<Value>, ApiError> {
    admin::reset_password(&state.pool, &acting, user_id, &body.new_password).await?;
    Ok(Json(json!({ "success": true, "message": "Password reset successfully" })))
}

/// `GET /admin/stats`
pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<admin::Stats>, ApiError> {
    let mut stats = admin::stats(&state.pool).await?;
    stats.document_sessions_in_memory = state.sessions.len().await;
    Ok(Json(stats))
}

// =============================================================================
// SECURE FOLDER
// =============================================================================

/// `GET /admin/secure-folders`
pub async fn list_secure_files(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Value>, ApiError> {
    let files = state.secure_folder.list().await?;
    Ok(Json(json!({
        "folder_path": state.secure_folder.root().display().to_string(),
        "total_files": files.len(),
        "files": files,
    })))
}

/// `POST /admin/secure-folders/upload`
pub async fn upload_secure_files(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    form: FormData,
) -> Result<Json<Value>, ApiError> {
    let stored = state.secure_folder.store(form.files).await?;
    tracing::info!(admin_id = acting.id, files = stored.len(), "secure folder upload");
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully uploaded {} file(s)", stored.len()),
        "files": stored,
    })))
}

/// `DELETE /admin/secure-folders/{filename}`
pub async fn delete_secure_file(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    WithRejection(Path(filename), _): PathParam<String>,
) -> Result<Json<Value>, ApiError> {
    state.secure_folder.delete(&filename).await?;
    tracing::info!(admin_id = acting.id, %filename, "secure folder delete");
    Ok(Json(json!({ "success": true, "message": format!("File {filename} deleted successfully") })))
}

/// `DELETE /admin/secure-folders/delete` — same as above, filename in a JSON
/// body the way the admin panel sends it.
pub async fn delete_secure_file_by_body(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    WithRejection(Json(body), _): JsonBody<DeleteFileBody>,
) -> Result<Json<Value>, ApiError> {
    let filename = body.filename.trim();
    if filename.is_empty() {
        return Err(ApiError::Validation("Filename is required".into()));
    }
    state.secure_folder.delete(filename).await?;
    tracing::info!(admin_id = acting.id, %filename, "secure folder delete");
    Ok(Json(json!({
        "success": true,
        "message": format!("File {filename} deleted successfully"),
        "filename": filename,
        "folder_name": body.folder_name,
    })))
}

/// `GET /admin/secure-folders/permissions`
pub async fn list_permissions(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<Value>, ApiError> {
    let grants = secure_folder::list_grants(&state.pool).await?;
    Ok(Json(json!(grants)))
}

/// `PUT /admin/secure-folders/permissions`
pub async fn set_permission(
    State(state): State<AppState>,
    AdminUser(acting): AdminUser,
    WithRejection(Json(body), _): JsonBody<GrantBody>,
) -> Result<Json<Value>, ApiError> {
    secure_folder::set_grant(&state.pool, body.user_id, body.has_access, acting.id).await?;
    tracing::info!(admin_id = acting.id, user_id = body.user_id, has_access = body.has_access, "secure folder grant");
    let verb = if body.has_access { "granted" } else { "revoked" };
    Ok(Json(json!({ "success": true, "message": format!("Secure folder access {verb}") })))
}
