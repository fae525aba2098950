/// Account lifecycle
///
/// Registration with email activation, password login with lockout,
/// password change and reset, OAuth sign-in and account deletion.
///
/// Errors carry messages that can be shown on the form that caused them.
/// Activation and reset tokens are only returned to the caller (who mails
/// them); the database stores their SHA-256.

use crate::auth::password::{hash_password, validate_password_length, verify_password, PasswordError, MIN_PASSWORD_LENGTH};
use crate::auth::tokens::{generate_secret_token, hash_token};
use crate::models::{CreateExternalUser, CreateUser, ExternalId, Fermentation, Ispindel, Measurement, User};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Failed password attempts before the account is locked
pub const MAX_FAILED_LOGINS: i32 = 5;

/// How long a locked account stays locked
pub const LOCKOUT_MINUTES: i64 = 15;

/// Lifetime of an activation link
pub const ACTIVATION_TTL_HOURS: i64 = 24;

/// Lifetime of a password-reset link
pub const RESET_TTL_HOURS: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("All fields are required")]
    MissingFields,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {min} characters long")]
    PasswordTooShort { min: usize },

    #[error("A user with this email address already exists")]
    EmailTaken,

    #[error("Invalid activation token")]
    InvalidActivationToken,

    #[error("Activation token has expired")]
    ActivationExpired,

    #[error("Account has already been activated")]
    AlreadyActivated,

    #[error("No user with this email address was found")]
    UserNotFound,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account has not been activated - check your email")]
    NotActivated,

    #[error("Account is temporarily locked - try again later")]
    Locked,

    #[error("Current password is incorrect")]
    WrongCurrentPassword,

    #[error("Password is required to delete the account")]
    PasswordRequired,

    #[error("Invalid or already used password reset link")]
    InvalidResetToken,

    #[error("Password reset link has expired")]
    ResetTokenExpired,

    #[error("The sign-in provider did not share an email address")]
    ExternalEmailMissing,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AccountError {
    /// Whether the error is caused by user input rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AccountError::Password(_) | AccountError::Database(_))
    }
}

/// Registration form input
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub ip: Option<String>,
}

/// Profile returned by an OAuth provider
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub external_id: ExternalId,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

fn check_new_password(password: &str, confirm: &str) -> Result<(), AccountError> {
    if password != confirm {
        return Err(AccountError::PasswordMismatch);
    }
    validate_password_length(password).map_err(|_| AccountError::PasswordTooShort {
        min: MIN_PASSWORD_LENGTH,
    })
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error()
        .and_then(|e| e.constraint())
        .map_or(false, |c| c == constraint)
}

/// Creates an inactive account and returns it with its activation token
pub async fn register(pool: &PgPool, input: RegisterInput) -> Result<(User, String), AccountError> {
    let name = input.name.trim();
    let email = input.email.trim();

    if name.is_empty() || email.is_empty() || input.password.is_empty() || input.password_confirm.is_empty() {
        return Err(AccountError::MissingFields);
    }
    check_new_password(&input.password, &input.password_confirm)?;

    if User::find_by_email(pool, email).await?.is_some() {
        return Err(AccountError::EmailTaken);
    }

    let token = generate_secret_token();
    let user = User::create(
        pool,
        CreateUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&input.password)?,
            registration_ip: input.ip,
            activation_token_hash: hash_token(&token),
            activation_expires_at: Utc::now() + Duration::hours(ACTIVATION_TTL_HOURS),
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "users_email_key") {
            AccountError::EmailTaken
        } else {
            AccountError::Database(e)
        }
    })?;

    info!(user_id = %user.id, "Registered user");

    Ok((user, token))
}

/// Activates the account the token was issued for
pub async fn activate(pool: &PgPool, token: &str) -> Result<User, AccountError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AccountError::InvalidActivationToken);
    }

    let user = User::find_by_activation_hash(pool, &hash_token(token))
        .await?
        .ok_or(AccountError::InvalidActivationToken)?;

    if user.activation_completed {
        return Err(AccountError::AlreadyActivated);
    }
    if user.activation_expires_at.map_or(true, |exp| exp < Utc::now()) {
        return Err(AccountError::ActivationExpired);
    }

    User::activate(pool, user.id).await?;
    info!(user_id = %user.id, "Activated user");

    Ok(user)
}

/// Issues a fresh activation token for an account that is not active yet
pub async fn resend_activation(pool: &PgPool, email: &str) -> Result<(User, String), AccountError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AccountError::MissingFields);
    }

    let user = User::find_by_email(pool, email)
        .await?
        .ok_or(AccountError::UserNotFound)?;

    if user.is_active {
        return Err(AccountError::AlreadyActivated);
    }

    let token = generate_secret_token();
    User::set_activation_token(
        pool,
        user.id,
        &hash_token(&token),
        Utc::now() + Duration::hours(ACTIVATION_TTL_HOURS),
    )
    .await?;

    Ok((user, token))
}

/// Password login
///
/// Every wrong password counts towards the lockout. The counter resets on
/// a successful login or a password reset.
pub async fn login(
    pool: &PgPool,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<User, AccountError> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AccountError::MissingFields);
    }

    let user = User::find_by_email(pool, email)
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

    let Some(hash) = user.password_hash.as_deref() else {
        return Err(AccountError::InvalidCredentials);
    };

    if !user.is_active {
        return Err(AccountError::NotActivated);
    }
    if user.is_locked(now) {
        return Err(AccountError::Locked);
    }

    if !verify_password(password, hash)? {
        let updated = User::record_failed_login(
            pool,
            user.id,
            MAX_FAILED_LOGINS,
            now + Duration::minutes(LOCKOUT_MINUTES),
        )
        .await?;

        warn!(
            user_id = %user.id,
            failed_logins = updated.failed_logins,
            locked = updated.is_locked(now),
            "Failed login attempt"
        );
        return Err(AccountError::InvalidCredentials);
    }

    User::record_successful_login(pool, user.id).await?;
    info!(user_id = %user.id, "User logged in");

    Ok(user)
}

pub async fn change_password(
    pool: &PgPool,
    user: &User,
    current: &str,
    new: &str,
    confirm: &str,
) -> Result<(), AccountError> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err(AccountError::MissingFields);
    }

    let hash = user
        .password_hash
        .as_deref()
        .ok_or(AccountError::WrongCurrentPassword)?;
    if !verify_password(current, hash)? {
        return Err(AccountError::WrongCurrentPassword);
    }

    check_new_password(new, confirm)?;

    User::update_password(pool, user.id, &hash_password(new)?).await?;
    info!(user_id = %user.id, "Changed password");

    Ok(())
}

/// Starts a password reset
///
/// Returns `None` for unknown emails so the caller can answer with the
/// same message either way.
pub async fn request_password_reset(
    pool: &PgPool,
    email: &str,
) -> Result<Option<(User, String)>, AccountError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AccountError::MissingFields);
    }

    let Some(user) = User::find_by_email(pool, email).await? else {
        info!("Password reset requested for unknown email");
        return Ok(None);
    };

    let token = generate_secret_token();
    User::set_password_reset_token(
        pool,
        user.id,
        &hash_token(&token),
        Utc::now() + Duration::hours(RESET_TTL_HOURS),
    )
    .await?;

    info!(user_id = %user.id, "Issued password reset token");

    Ok(Some((user, token)))
}

/// Looks up the account a reset token belongs to
pub async fn find_reset_user(pool: &PgPool, token: &str) -> Result<User, AccountError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AccountError::InvalidResetToken);
    }

    let user = User::find_by_reset_hash(pool, &hash_token(token))
        .await?
        .ok_or(AccountError::InvalidResetToken)?;

    if user.password_reset_expires_at.map_or(true, |exp| exp < Utc::now()) {
        return Err(AccountError::ResetTokenExpired);
    }

    Ok(user)
}

/// Sets a new password from a reset link and lifts any lockout
pub async fn reset_password(
    pool: &PgPool,
    token: &str,
    new: &str,
    confirm: &str,
) -> Result<User, AccountError> {
    let user = find_reset_user(pool, token).await?;

    if new.is_empty() || confirm.is_empty() {
        return Err(AccountError::MissingFields);
    }
    check_new_password(new, confirm)?;

    User::reset_password(pool, user.id, &hash_password(new)?).await?;
    info!(user_id = %user.id, "Reset password");

    Ok(user)
}

/// Deletes an account with everything it owns
///
/// `password` is checked when given and the account has one; the admin
/// panel passes `None`. Measurements, fermentations, devices and the user
/// row go in that order inside one transaction.
pub async fn delete_account(pool: &PgPool, user: &User, password: Option<&str>) -> Result<(), AccountError> {
    if let (Some(password), Some(hash)) = (password, user.password_hash.as_deref()) {
        if password.is_empty() {
            return Err(AccountError::PasswordRequired);
        }
        if !verify_password(password, hash)? {
            return Err(AccountError::WrongCurrentPassword);
        }
    }

    let mut tx = pool.begin().await?;

    let measurements = Measurement::delete_for_user(&mut *tx, user.id).await?;
    let fermentations = Fermentation::delete_for_user(&mut *tx, user.id).await?;
    let devices = Ispindel::delete_for_user(&mut *tx, user.id).await?;
    User::delete(&mut *tx, user.id).await?;

    tx.commit().await?;

    info!(
        user_id = %user.id,
        measurements,
        fermentations,
        devices,
        "Deleted account"
    );

    Ok(())
}

/// Signs in through an OAuth provider
///
/// Matches by provider id, then by email (linking the provider to the
/// existing account), and creates an account otherwise. Provider-verified
/// emails count as activated.
pub async fn upsert_external(pool: &PgPool, profile: ExternalProfile) -> Result<User, AccountError> {
    let email = profile.email.trim();
    if email.is_empty() {
        return Err(AccountError::ExternalEmailMissing);
    }

    if let Some(user) = User::find_by_external_id(pool, &profile.external_id).await? {
        User::update_last_login(pool, user.id).await?;
        info!(user_id = %user.id, "OAuth login");
        return Ok(user);
    }

    if let Some(existing) = User::find_by_email(pool, email).await? {
        let user = User::link_external(pool, existing.id, &profile.external_id, profile.picture.as_deref()).await?;
        User::update_last_login(pool, user.id).await?;
        info!(user_id = %user.id, "Linked OAuth identity to existing account");
        return Ok(user);
    }

    let name = match profile.name.trim() {
        "" => email.split('@').next().unwrap_or(email).to_string(),
        name => name.to_string(),
    };

    let user = User::create_external(
        pool,
        CreateExternalUser {
            name,
            email: email.to_string(),
            external_id: profile.external_id,
            picture: profile.picture,
        },
    )
    .await?;

    info!(user_id = %user.id, "Created account from OAuth profile");

    Ok(user)
}

/// Client address: first `X-Forwarded-For` entry, else the peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_check_new_password() {
        assert!(check_new_password("longenough", "longenough").is_ok());
        assert!(matches!(
            check_new_password("longenough", "different1"),
            Err(AccountError::PasswordMismatch)
        ));
        assert!(matches!(
            check_new_password("short", "short"),
            Err(AccountError::PasswordTooShort { min: 8 })
        ));
    }

    #[test]
    fn test_client_ip() {
        let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        let mut headers = HeaderMap::new();

        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.7"));
        assert_eq!(client_ip(&headers, None), None);

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_client_errors() {
        assert!(AccountError::InvalidCredentials.is_client_error());
        assert!(AccountError::Locked.is_client_error());
        assert!(!AccountError::Database(sqlx::Error::RowNotFound).is_client_error());
    }
}
