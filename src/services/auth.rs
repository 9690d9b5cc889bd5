//! Account service — registration, password login, admin bootstrap.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use sqlx::PgPool;

use super::session::{self, SessionUser, USER_COLUMNS, UserRole};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is suspended")]
    Inactive,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Password must be at least 6 characters long")]
    WeakPassword,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// PASSWORDS
// =============================================================================

/// Argon2id hash in PHC string form, with a random salt.
///
/// # Errors
///
/// Returns [`AuthError::Hash`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Constant-time verification. A malformed stored hash verifies as false.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .is_ok_and(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// # Errors
///
/// Returns [`AuthError::WeakPassword`] below the minimum length.
pub fn check_password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

// =============================================================================
// ACCOUNTS
// =============================================================================

/// Create a regular user account.
///
/// # Errors
///
/// Rejects malformed emails, weak passwords and duplicate emails.
pub async fn register(pool: &PgPool, email: &str, full_name: &str, password: &str) -> Result<SessionUser, AuthError> {
    let email = normalize_email(email)?;
    check_password_strength(password)?;
    insert_user(pool, &email, full_name.trim(), password, UserRole::User).await
}

async fn insert_user(
    pool: &PgPool,
    email: &str,
    full_name: &str,
    password: &str,
    role: UserRole,
) -> Result<SessionUser, AuthError> {
    let hash = hash_password(password)?;
    let sql = format!(
        "WITH u AS (
             INSERT INTO users (email, full_name, password_hash, role)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (email) DO NOTHING
             RETURNING *
         )
         SELECT {USER_COLUMNS} FROM u"
    );
    let row = sqlx::query(&sql)
        .bind(email)
        .bind(full_name)
        .bind(hash)
        .bind(role.as_str())
        .fetch_optional(pool)
        .await?;

    let user = row.as_ref().map(SessionUser::from_row).ok_or(AuthError::EmailTaken)?;
    tracing::info!(user_id = user.id, role = role.as_str(), "user registered");
    Ok(user)
}

/// Check credentials, stamp `last_login` and open a session.
///
/// # Errors
///
/// Unknown email and wrong password both yield [`AuthError::InvalidCredentials`].
pub async fn login(pool: &PgPool, email: &str, password: &str) -> Result<(String, SessionUser), AuthError> {
    let email = email.trim().to_lowercase();
    let sql = format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.email = $1");
    let Some(row) = sqlx::query(&sql).bind(&email).fetch_optional(pool).await? else {
        return Err(AuthError::InvalidCredentials);
    };

    let stored: String = sqlx::Row::get(&row, "password_hash");
    if !verify_password(password, &stored) {
        return Err(AuthError::InvalidCredentials);
    }
    let user = SessionUser::from_row(&row);
    if !user.is_active {
        return Err(AuthError::Inactive);
    }

    sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
        .bind(user.id)
        .execute(pool)
        .await?;
    let token = session::create_session(pool, user.id).await?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok((token, user))
}

/// Create the bootstrap admin from `ADMIN_EMAIL` / `ADMIN_PASSWORD` /
/// `ADMIN_NAME` when set and not yet registered. Existing accounts are left
/// alone.
///
/// # Errors
///
/// Propagates validation and database failures.
pub async fn ensure_admin_from_env(pool: &PgPool) -> Result<(), AuthError> {
    let (Ok(email), Ok(password)) = (std::env::var("ADMIN_EMAIL"), std::env::var("ADMIN_PASSWORD")) else {
        return Ok(());
    };
    let name = std::env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_owned());
    let email = normalize_email(&email)?;
    check_password_strength(&password)?;

    match insert_user(pool, &email, &name, &password, UserRole::Admin).await {
        Ok(_) | Err(AuthError::EmailTaken) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
