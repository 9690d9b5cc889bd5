//! User administration and usage counts for the admin panel.
//!
//! Self-protection rules live here rather than in the routes: an admin can
//! neither demote nor suspend their own account, so there is always at least
//! the acting admin left with access.

use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::auth::{self, AuthError};
use super::session::{SessionUser, USER_COLUMNS, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Cannot demote yourself from admin role")]
    SelfDemotion,

    #[error("Cannot suspend your own account")]
    SelfSuspension,

    #[error("Invalid role")]
    InvalidRole,

    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminUserRow {
    #[serde(flatten)]
    pub user: SessionUser,
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_users: i64,
    pub active_users: i64,
    pub admin_users: i64,
    pub total_chat_sessions: i64,
    pub total_messages: i64,
    pub document_sessions_in_memory: usize,
}

const RECENT_SESSION_LIMIT: i64 = 10;
const UNTITLED: &str = "Untitled Chat";

/// Filters for [`search_users`]. Unrecognised role or status values are
/// ignored rather than rejected.
#[derive(Debug, Clone, Default)]
pub struct UserSearch {
    pub q: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityUser {
    pub id: i64,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub chat_sessions: i64,
    pub messages_sent: i64,
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySession {
    pub session_id: Uuid,
    pub title: String,
    pub created_at: String,
    pub has_document_context: bool,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserActivity {
    pub user: ActivityUser,
    pub period: String,
    pub summary: ActivitySummary,
    pub recent_sessions: Vec<ActivitySession>,
}

/// `%q%` for ILIKE with the pattern metacharacters escaped. `None` for a
/// blank query.
fn like_pattern(q: &str) -> Option<String> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

fn status_filter(status: &str) -> Option<bool> {
    match status {
        "active" => Some(true),
        "inactive" => Some(false),
        _ => None,
    }
}

/// Newest accounts first.
pub async fn list_users(pool: &PgPool, skip: i64, limit: i64) -> Result<Vec<AdminUserRow>, sqlx::Error> {
    let sql = format!(
        r#"SELECT {USER_COLUMNS},
                  to_char(u.last_login AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS last_login
           FROM users u
           ORDER BY u.created_at DESC, u.id DESC
           OFFSET $1 LIMIT $2"#
    );
    let rows = sqlx::query(&sql)
        .bind(skip.max(0))
        .bind(limit.clamp(1, 500))
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|r| AdminUserRow { user: SessionUser::from_row(r), last_login: r.get("last_login") })
        .collect())
}

/// Name/email substring match plus optional role and status filters.
pub async fn search_users(pool: &PgPool, search: &UserSearch) -> Result<Vec<AdminUserRow>, sqlx::Error> {
    let sql = format!(
        r#"SELECT {USER_COLUMNS},
                  to_char(u.last_login AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS last_login
           FROM users u
           WHERE ($1::text IS NULL OR u.full_name ILIKE $1 OR u.email ILIKE $1)
             AND ($2::text IS NULL OR u.role = $2)
             AND ($3::boolean IS NULL OR u.is_active = $3)
           ORDER BY u.created_at DESC, u.id DESC
           LIMIT $4"#
    );
    let rows = sqlx::query(&sql)
        .bind(search.q.as_deref().and_then(like_pattern))
        .bind(search.role.as_deref().and_then(UserRole::parse).map(UserRole::as_str))
        .bind(search.status.as_deref().and_then(status_filter))
        .bind(search.limit.clamp(1, 500))
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|r| AdminUserRow { user: SessionUser::from_row(r), last_login: r.get("last_login") })
        .collect())
}

/// Chat activity of one user over the last `days` days.
///
/// # Errors
///
/// [`AdminError::UserNotFound`] for unknown ids.
pub async fn user_activity(pool: &PgPool, user_id: i64, days: i32) -> Result<UserActivity, AdminError> {
    let days = days.clamp(1, 3650);
    let user = sqlx::query(
        r#"SELECT id, email, full_name,
                  to_char(last_login AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS last_login
           FROM users WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AdminError::UserNotFound)?;

    let counts = sqlx::query(
        r"SELECT
              (SELECT count(*) FROM chat_sessions
               WHERE user_id = $1 AND created_at >= now() - make_interval(days => $2)) AS chat_sessions,
              (SELECT count(*) FROM messages
               WHERE user_id = $1 AND message_type = 'user'
                 AND created_at >= now() - make_interval(days => $2)) AS messages_sent",
    )
    .bind(user_id)
    .bind(days)
    .fetch_one(pool)
    .await?;

    let recent = sqlx::query(
        r#"SELECT c.session_id, c.title, c.has_document_context,
                  to_char(c.created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
                  (SELECT count(*) FROM messages m WHERE m.chat_session_id = c.id) AS message_count
           FROM chat_sessions c
           WHERE c.user_id = $1 AND c.created_at >= now() - make_interval(days => $2)
           ORDER BY c.created_at DESC, c.id DESC
           LIMIT $3"#,
    )
    .bind(user_id)
    .bind(days)
    .bind(RECENT_SESSION_LIMIT)
    .fetch_all(pool)
    .await?;

    let recent_sessions = recent
        .iter()
        .map(|r| {
            let title: Option<String> = r.get("title");
            ActivitySession {
                session_id: r.get("session_id"),
                title: title.unwrap_or_else(|| UNTITLED.to_owned()),
                created_at: r.get("created_at"),
                has_document_context: r.get("has_document_context"),
                message_count: r.get("message_count"),
            }
        })
        .collect();

    Ok(UserActivity {
        user: ActivityUser { id: user.get("id"), email: user.get("email"), full_name: user.get("full_name") },
        period: format!("Last {days} days"),
        summary: ActivitySummary {
            chat_sessions: counts.get("chat_sessions"),
            messages_sent: counts.get("messages_sent"),
            last_login: user.get("last_login"),
        },
        recent_sessions,
    })
}

/// # Errors
///
/// [`AdminError::InvalidRole`] for unknown roles, [`AdminError::SelfDemotion`]
/// when the acting admin targets their own account with a non-admin role.
pub async fn update_role(pool: &PgPool, acting: &SessionUser, user_id: i64, role: &str) -> Result<(), AdminError> {
    let role = UserRole::parse(role).ok_or(AdminError::InvalidRole)?;
    if acting.id == user_id && role != UserRole::Admin {
        return Err(AdminError::SelfDemotion);
    }
    let result = sqlx::query("UPDATE users SET role = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AdminError::UserNotFound);
    }
    tracing::info!(admin_id = acting.id, user_id, role = role.as_str(), "user role updated");
    Ok(())
}

/// Suspending a user also ends their open sessions.
///
/// # Errors
///
/// [`AdminError::SelfSuspension`] when the acting admin suspends themselves.
pub async fn update_status(
    pool: &PgPool,
    acting: &SessionUser,
    user_id: i64,
    is_active: bool,
) -> Result<(), AdminError> {
    if acting.id == user_id && !is_active {
        return Err(AdminError::SelfSuspension);
    }
    let mut tx = pool.begin().await?;
    let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(is_active)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AdminError::UserNotFound);
    }
    if !is_active {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    tracing::info!(admin_id = acting.id, user_id, is_active, "user status updated");
    Ok(())
}

/// # Errors
///
/// Rejects passwords shorter than the minimum length.
pub async fn reset_password(
    pool: &PgPool,
    acting: &SessionUser,
    user_id: i64,
    new_password: &str,
) -> Result<(), AdminError> {
    auth::check_password_strength(new_password)?;
    let hash = auth::hash_password(new_password)?;
    let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(hash)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AdminError::UserNotFound);
    }
    tracing::info!(admin_id = acting.id, user_id, "user password reset");
    Ok(())
}

/// Database counts. The caller fills in the in-memory session count.
pub async fn stats(pool: &PgPool) -> Result<Stats, sqlx::Error> {
    let row = sqlx::query(
        r"SELECT
              (SELECT count(*) FROM users) AS total_users,
              (SELECT count(*) FROM users WHERE is_active) AS active_users,
              (SELECT count(*) FROM users WHERE role = 'admin') AS admin_users,
              (SELECT count(*) FROM chat_sessions) AS total_chat_sessions,
              (SELECT count(*) FROM messages) AS total_messages",
    )
    .fetch_one(pool)
    .await?;
    Ok(Stats {
        total_users: row.get("total_users"),
        active_users: row.get("active_users"),
        admin_users: row.get("admin_users"),
        total_chat_sessions: row.get("total_chat_sessions"),
        total_messages: row.get("total_messages"),
        document_sessions_in_memory: 0,
    })
}

#[cfg(test)]
#[path = "admin_test.rs"]
mod tests;
