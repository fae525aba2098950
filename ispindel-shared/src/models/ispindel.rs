/// iSpindel device model
///
/// A device belongs to one user and authenticates its telemetry with
/// `api_key`. Devices are soft-deleted (`deleted_at`) so historical
/// fermentations keep their readings; every read below filters deleted rows
/// out.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE ispindels (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
///     name VARCHAR(255) NOT NULL,
///     device_id VARCHAR(255) NOT NULL DEFAULT '',
///     api_key VARCHAR(64) NOT NULL UNIQUE,
///     description TEXT NOT NULL DEFAULT '',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     last_seen TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Device row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ispindel {
    pub id: Uuid,
    pub user_id: Uuid,

    /// User-facing name, overwritten by the name the firmware reports
    pub name: String,

    /// Chip id reported by the firmware (`ID` field)
    pub device_id: String,

    /// Secret used in the ingestion URL
    pub api_key: String,

    pub description: String,

    /// Inactive devices cannot be attached to new fermentations
    pub is_active: bool,

    /// Last accepted reading
    pub last_seen: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for registering a device
#[derive(Debug, Clone)]
pub struct CreateIspindel {
    pub user_id: Uuid,
    pub name: String,
    pub description: String,
    pub api_key: String,
}

/// Device joined with its owner's name, for the admin panel
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IspindelWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub ispindel: Ispindel,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

impl Ispindel {
    pub async fn create(pool: &PgPool, data: CreateIspindel) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            r#"
            INSERT INTO ispindels (user_id, name, description, api_key)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.api_key)
        .fetch_one(pool)
        .await
    }

    /// Finds a device only if it belongs to `user_id`
    pub async fn find_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            "SELECT * FROM ispindels WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Finds a device regardless of owner (admin panel)
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>("SELECT * FROM ispindels WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Resolves the device behind an ingestion request
    pub async fn find_by_api_key(pool: &PgPool, api_key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            "SELECT * FROM ispindels WHERE api_key = $1 AND deleted_at IS NULL",
        )
        .bind(api_key)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            r#"
            SELECT * FROM ispindels
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM ispindels WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Active devices not attached to an active fermentation
    pub async fn list_available(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            r#"
            SELECT i.* FROM ispindels i
            WHERE i.user_id = $1 AND i.deleted_at IS NULL AND i.is_active
              AND NOT EXISTS (
                  SELECT 1 FROM fermentations f
                  WHERE f.ispindel_id = i.id AND f.is_active AND f.deleted_at IS NULL
              )
            ORDER BY i.name
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Active devices currently measuring an active fermentation
    pub async fn list_busy(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            r#"
            SELECT i.* FROM ispindels i
            WHERE i.user_id = $1 AND i.deleted_at IS NULL AND i.is_active
              AND EXISTS (
                  SELECT 1 FROM fermentations f
                  WHERE f.ispindel_id = i.id AND f.is_active AND f.deleted_at IS NULL
              )
            ORDER BY i.name
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Updates the user-editable fields, returns `None` if not owned
    pub async fn update_details(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        name: &str,
        description: &str,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            r#"
            UPDATE ispindels
            SET name = $3, description = $4, is_active = $5, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(description)
        .bind(is_active)
        .fetch_optional(pool)
        .await
    }

    /// Replaces the API key, returns `None` if not owned
    pub async fn set_api_key(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        api_key: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            r#"
            UPDATE ispindels
            SET api_key = $3, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(api_key)
        .fetch_optional(pool)
        .await
    }

    /// Takes a row lock on the device for the rest of the transaction
    ///
    /// Serialises concurrent readings from the same device so the
    /// minimum-interval check cannot be raced.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ispindel>(
            "SELECT * FROM ispindels WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Records that a reading arrived
    ///
    /// `device_id` and `name` are only overwritten when the firmware sent
    /// them.
    pub async fn record_contact(
        conn: &mut PgConnection,
        id: Uuid,
        seen_at: DateTime<Utc>,
        device_id: Option<&str>,
        name: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE ispindels
            SET last_seen = $2,
                device_id = COALESCE($3, device_id),
                name = COALESCE($4, name),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(seen_at)
        .bind(device_id)
        .bind(name)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Soft-deletes the device
    pub async fn soft_delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE ispindels SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every device with its owner, newest first (admin panel)
    pub async fn list_all_with_owner(pool: &PgPool) -> Result<Vec<IspindelWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, IspindelWithOwner>(
            r#"
            SELECT i.*, u.name AS owner_name, u.email AS owner_email
            FROM ispindels i
            LEFT JOIN users u ON u.id = i.user_id
            WHERE i.deleted_at IS NULL
            ORDER BY i.created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Hard-deletes every device of a user, soft-deleted ones included
    pub async fn delete_for_user(conn: &mut PgConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ispindels WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM ispindels WHERE deleted_at IS NULL")
            .fetch_one(pool)
            .await
    }
}
