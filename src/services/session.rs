//! Bearer session management.
//!
//! ARCHITECTURE
//! ============
//! Login mints an opaque random token stored in `sessions` with an expiry.
//! Clients send it as `Authorization: Bearer …` (or the `session_token`
//! cookie); every authenticated request re-validates it against the database,
//! so logout and suspension take effect immediately.

use std::fmt::Write;

use rand::Rng;
use serde::Serialize;
use sqlx::{PgPool, Row};

const DEFAULT_SESSION_TTL_DAYS: i32 = 7;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

pub(crate) fn session_ttl_days() -> i32 {
    std::env::var("SESSION_TTL_DAYS")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_SESSION_TTL_DAYS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// User row returned from session validation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: String,
}

impl SessionUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub(crate) fn from_row(row: &sqlx::postgres::PgRow) -> Self {
        let role: String = row.get("role");
        Self {
            id: row.get("id"),
            email: row.get("email"),
            full_name: row.get("full_name"),
            role: UserRole::parse(&role).unwrap_or(UserRole::User),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }
}

/// Columns expected by [`SessionUser::from_row`], prefixed with `u.`.
pub(crate) const USER_COLUMNS: &str = r#"u.id, u.email, u.full_name, u.role, u.is_active,
    to_char(u.created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at"#;

/// Create a session for the given user, returning the token.
pub async fn create_session(pool: &PgPool, user_id: i64) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, now() + make_interval(days => $3))")
        .bind(&token)
        .bind(user_id)
        .bind(session_ttl_days())
        .execute(pool)
        .await?;
    Ok(token)
}

/// Validate a session token and return the associated active user.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<SessionUser>, sqlx::Error> {
    let sql = format!(
        "SELECT {USER_COLUMNS}
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = $1 AND s.expires_at > now() AND u.is_active"
    );
    let row = sqlx::query(&sql).bind(token).fetch_optional(pool).await?;
    Ok(row.as_ref().map(SessionUser::from_row))
}

/// Delete a session by token.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove expired sessions. Returns how many were deleted.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
