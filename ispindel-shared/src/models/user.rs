/// User model and database operations
///
/// A user either registers with email and password (and must activate the
/// account through an emailed link) or signs in through Google or piwo.org,
/// in which case the account is active immediately and has no password.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     email VARCHAR(255) NOT NULL,   -- unique on LOWER(email)
///     password_hash VARCHAR(255),
///     last_login_at TIMESTAMPTZ,
///     failed_logins INTEGER NOT NULL DEFAULT 0,
///     locked_until TIMESTAMPTZ,
///     registration_ip VARCHAR(64),
///     is_active BOOLEAN NOT NULL DEFAULT FALSE,
///     activation_token_hash VARCHAR(64),
///     activation_expires_at TIMESTAMPTZ,
///     activation_completed BOOLEAN NOT NULL DEFAULT FALSE,
///     password_reset_token_hash VARCHAR(64),
///     password_reset_expires_at TIMESTAMPTZ,
///     google_id VARCHAR(255) UNIQUE,
///     piwo_id BIGINT UNIQUE,
///     picture VARCHAR(1024),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use ispindel_shared::models::user::{User, CreateUser};
/// use sqlx::{PgConnection, PgPool};
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(
///     &pool,
///     CreateUser {
///         name: "Ada".to_string(),
///         email: "ada@example.com".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///         registration_ip: Some("203.0.113.7".to_string()),
///         activation_token_hash: "9f86d0...".to_string(),
///         activation_expires_at: chrono::Utc::now() + chrono::Duration::hours(24),
///     },
/// )
/// .await?;
///
/// let found = User::find_by_email(&pool, "ADA@example.com").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// User account row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address, unique and matched case-insensitively
    pub email: String,

    /// Argon2id hash, `None` for accounts created through OAuth
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// Last successful sign-in
    pub last_login_at: Option<DateTime<Utc>>,

    /// Consecutive failed password attempts since the last success
    pub failed_logins: i32,

    /// Password logins are refused until this instant
    pub locked_until: Option<DateTime<Utc>>,

    /// Client address the account was registered from
    pub registration_ip: Option<String>,

    /// Whether the account may sign in
    pub is_active: bool,

    /// SHA-256 of the pending activation token
    #[serde(skip_serializing)]
    pub activation_token_hash: Option<String>,

    /// When the pending activation token stops working
    pub activation_expires_at: Option<DateTime<Utc>>,

    /// Set once the activation link was used (or an OAuth provider vouched
    /// for the email)
    pub activation_completed: bool,

    /// SHA-256 of the pending password-reset token
    #[serde(skip_serializing)]
    pub password_reset_token_hash: Option<String>,

    /// When the pending password-reset token stops working
    pub password_reset_expires_at: Option<DateTime<Utc>>,

    /// Google account subject
    pub google_id: Option<String>,

    /// piwo.org account id
    pub piwo_id: Option<i64>,

    /// Avatar URL supplied by an OAuth provider
    pub picture: Option<String>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for a password registration
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,
    pub registration_ip: Option<String>,
    pub activation_token_hash: String,
    pub activation_expires_at: DateTime<Utc>,
}

/// Identity asserted by an OAuth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalId {
    Google(String),
    Piwo(i64),
}

/// Input for an account created on first OAuth sign-in
#[derive(Debug, Clone)]
pub struct CreateExternalUser {
    pub name: String,
    pub email: String,
    pub external_id: ExternalId,
    pub picture: Option<String>,
}

impl User {
    /// Whether password logins are currently refused
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map_or(false, |until| until > now)
    }

    /// Creates an inactive user awaiting email activation
    ///
    /// # Errors
    ///
    /// Returns a database error carrying the `users_email_key` constraint if
    /// the email is already taken.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, registration_ip,
                               activation_token_hash, activation_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(data.name)
        .bind(data.email)
        .bind(data.password_hash)
        .bind(data.registration_ip)
        .bind(data.activation_token_hash)
        .bind(data.activation_expires_at)
        .fetch_one(pool)
        .await
    }

    /// Creates an active, already-activated user for an OAuth identity
    pub async fn create_external(
        pool: &PgPool,
        data: CreateExternalUser,
    ) -> Result<Self, sqlx::Error> {
        let (google_id, piwo_id) = match data.external_id {
            ExternalId::Google(id) => (Some(id), None),
            ExternalId::Piwo(id) => (None, Some(id)),
        };

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, google_id, piwo_id, picture,
                               is_active, activation_completed, last_login_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, TRUE, NOW())
            RETURNING *
            "#,
        )
        .bind(data.name)
        .bind(data.email)
        .bind(google_id)
        .bind(piwo_id)
        .bind(data.picture)
        .fetch_one(pool)
        .await
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Finds the user bound to an OAuth identity
    pub async fn find_by_external_id(
        pool: &PgPool,
        external_id: &ExternalId,
    ) -> Result<Option<Self>, sqlx::Error> {
        match external_id {
            ExternalId::Google(id) => {
                sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = $1")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            }
            ExternalId::Piwo(id) => {
                sqlx::query_as::<_, User>("SELECT * FROM users WHERE piwo_id = $1")
                    .bind(id)
                    .fetch_optional(pool)
                    .await
            }
        }
    }

    /// Finds the user holding an activation token (by its SHA-256 hash)
    pub async fn find_by_activation_hash(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE activation_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Finds the user holding a password-reset token (by its SHA-256 hash)
    pub async fn find_by_reset_hash(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE password_reset_token_hash = $1")
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Counts a failed password attempt
    ///
    /// The increment and the lock decision happen in one statement so two
    /// concurrent failures cannot both slip under the threshold. When the
    /// new count reaches `max_attempts`, `locked_until` is set to
    /// `lock_until`.
    pub async fn record_failed_login(
        pool: &PgPool,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET failed_logins = failed_logins + 1,
                locked_until = CASE
                    WHEN failed_logins + 1 >= $2 THEN $3
                    ELSE locked_until
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .bind(lock_until)
        .fetch_one(pool)
        .await
    }

    /// Resets the failure counter and stamps `last_login_at`
    pub async fn record_successful_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_logins = 0, locked_until = NULL,
                last_login_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Marks the account active and consumes the activation token
    pub async fn activate(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET is_active = TRUE, activation_completed = TRUE,
                activation_token_hash = NULL, activation_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Replaces the pending activation token
    pub async fn set_activation_token(
        pool: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET activation_token_hash = $2, activation_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Stores a pending password-reset token
    pub async fn set_password_reset_token(
        pool: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token_hash = $2, password_reset_expires_at = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Sets a new password from a reset link
    ///
    /// Consumes the reset token and lifts any login lock.
    pub async fn reset_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_reset_token_hash = NULL, password_reset_expires_at = NULL,
                failed_logins = 0, locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Replaces the password hash
    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Binds an OAuth identity to an existing account
    ///
    /// The provider has verified the email, so the account is activated as
    /// well. The picture is only replaced when the provider sent one.
    pub async fn link_external(
        pool: &PgPool,
        id: Uuid,
        external_id: &ExternalId,
        picture: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let column = match external_id {
            ExternalId::Google(_) => "google_id",
            ExternalId::Piwo(_) => "piwo_id",
        };

        let query = format!(
            r#"
            UPDATE users
            SET {column} = $2, picture = COALESCE($3, picture),
                is_active = TRUE, activation_completed = TRUE,
                activation_token_hash = NULL, activation_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        );

        let q = sqlx::query_as::<_, User>(&query).bind(id);
        let q = match external_id {
            ExternalId::Google(gid) => q.bind(gid.clone()),
            ExternalId::Piwo(pid) => q.bind(*pid),
        };

        q.bind(picture).fetch_one(pool).await
    }

    /// Stamps `last_login_at` without touching the failure counter
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Lists every account, newest first (admin panel)
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(pool)
            .await
    }

    /// Counts all accounts
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }

    /// Counts activated accounts
    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active")
            .fetch_one(pool)
            .await
    }

    /// Deletes the user row. Callers remove dependent rows first in the
    /// same transaction (see `accounts::delete_account`).
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
