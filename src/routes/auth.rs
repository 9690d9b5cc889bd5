//! Auth routes — password registration/login, bearer sessions, extractors.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::WithRejection;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use serde_json::json;
use time::Duration;

use super::form::JsonBody;
use crate::error::ApiError;
use crate::services::{auth as auth_svc, session};
use crate::state::AppState;

const COOKIE_NAME: &str = "session_token";

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn cookie_secure() -> bool {
    env_bool("COOKIE_SECURE").unwrap_or(false)
}

/// Token from `Authorization: Bearer …`, else the `session_token` cookie.
pub(crate) fn request_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_owned());
    }
    let jar = CookieJar::from_headers(headers);
    jar.get(COOKIE_NAME).map(Cookie::value).filter(|t| !t.is_empty()).map(str::to_owned)
}

// =============================================================================
// AUTH EXTRACTORS
// =============================================================================

/// Authenticated user extracted from the bearer token or session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let not_authenticated = || ApiError::Unauthorized("Could not validate credentials".into());
        let token = request_token(&parts.headers).ok_or_else(not_authenticated)?;

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, &token)
            .await?
            .ok_or_else(not_authenticated)?;

        Ok(Self { user, token })
    }
}

/// [`AuthUser`] holding the admin role.
pub struct AdminUser(pub session::SessionUser);

impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser { user, .. } = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".into()));
        }
        Ok(Self(user))
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct RegisterBody {
    email: String,
    full_name: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

/// `POST /auth/register` — create a regular account.
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(body), _): JsonBody<RegisterBody>,
) -> Result<Json<session::SessionUser>, ApiError> {
    let user = auth_svc::register(&state.pool, &body.email, &body.full_name, &body.password).await?;
    Ok(Json(user))
}

/// `POST /auth/login` — verify credentials, return a bearer token and set the
/// session cookie.
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(body), _): JsonBody<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (token, user) = auth_svc::login(&state.pool, &body.email, &body.password).await?;

    let cookie = Cookie::build((COOKIE_NAME, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .secure(cookie_secure())
        .max_age(Duration::days(i64::from(session::session_ttl_days())));
    let jar = CookieJar::new().add(cookie);

    Ok((jar, Json(json!({ "access_token": token, "token_type": "bearer", "user": user }))))
}

/// `GET /auth/me` — return current user.
pub async fn me(auth: AuthUser) -> Json<session::SessionUser> {
    Json(auth.user)
}

/// `POST /auth/logout` — delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(e) = session::delete_session(&state.pool, &auth.token).await {
        tracing::warn!(error = %e, user_id = auth.user.id, "logout: session delete failed");
    }

    let cookie = Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .secure(cookie_secure())
        .max_age(Duration::ZERO);

    let jar = CookieJar::new().add(cookie);
    (jar, StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
