//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the whole API: public quota-gated endpoints,
//! authenticated chat and document analysis, chat history, and the admin
//! panel. CORS origins and the upload ceiling come from the environment.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod documents;
pub mod form;

#[cfg(test)]
pub mod test_support;

use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{delete, get, post, put};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::rate_limit::ClientIp;
use crate::state::AppState;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://127.0.0.1:5173";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

fn allowed_origins() -> Vec<HeaderValue> {
    let raw = std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_owned());
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

fn max_upload_bytes() -> usize {
    std::env::var("MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins()))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/rate-limit/status", get(rate_limit_status))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        // Chat
        .route("/chat", post(chat::chat))
        .route("/chat/public", post(chat::chat_public))
        .route("/chat/history", get(chat::list_history).delete(chat::clear_history))
        .route("/chat/history/{session_id}", get(chat::get_history).delete(chat::delete_history))
        .route("/chat/history/{session_id}/title", put(chat::rename_history))
        // Documents
        .route("/analyze-document", post(documents::analyze))
        .route("/analyze-document/public", post(documents::analyze_public))
        .route("/analyze-secure-folder", post(documents::analyze_secure_folder))
        .route("/user/secure-folder/permission", get(documents::secure_folder_permission))
        // Admin
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/search", get(admin::search_users))
        .route("/admin/users/{id}/activity", get(admin::user_activity))
        .route("/admin/users/{id}/role", put(admin::update_role))
        .route("/admin/users/{id}/status", put(admin::update_status))
        .route("/admin/users/{id}/reset-password", post(admin::reset_password))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/secure-folders", get(admin::list_secure_files))
        .route("/admin/secure-folders/upload", post(admin::upload_secure_files))
        .route(
            "/admin/secure-folders/permissions",
            get(admin::list_permissions).put(admin::set_permission),
        )
        .route("/admin/secure-folders/delete", delete(admin::delete_secure_file_by_body))
        .route("/admin/secure-folders/{filename}", delete(admin::delete_secure_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Document chat API", "status": "ok" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /rate-limit/status` — effective counters for the caller's IP.
async fn rate_limit_status(State(state): State<AppState>, ClientIp(ip): ClientIp) -> Json<Value> {
    let status = state.rate_limiter.status(&ip);
    Json(json!({
        "requests": status.requests,
        "files": status.files,
        "maxRequests": status.max_requests,
        "maxFiles": status.max_files,
        "resetTime": status.reset_at.map_or(0, time::OffsetDateTime::unix_timestamp),
    }))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
