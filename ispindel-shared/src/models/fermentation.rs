/// Fermentation (brewing batch) model
///
/// A fermentation is tied to at most one device. The link is cleared
/// (`ispindel_id = NULL`) when the device is deleted while the batch is
/// still running. Rows are soft-deleted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE fermentations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
///     ispindel_id UUID REFERENCES ispindels (id) ON DELETE SET NULL,
///     name VARCHAR(255) NOT NULL,
///     style VARCHAR(255) NOT NULL DEFAULT '',
///     style_id VARCHAR(32) NOT NULL DEFAULT '',
///     style_category VARCHAR(255) NOT NULL DEFAULT '',
///     description TEXT NOT NULL DEFAULT '',
///     started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     ended_at TIMESTAMPTZ,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Fermentation row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fermentation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ispindel_id: Option<Uuid>,
    pub name: String,
    pub style: String,
    pub style_id: String,
    pub style_category: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for starting a fermentation
#[derive(Debug, Clone)]
pub struct CreateFermentation {
    pub user_id: Uuid,
    pub ispindel_id: Uuid,
    pub name: String,
    pub style: String,
    pub style_id: String,
    pub style_category: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

/// Fermentation joined with its owner's name, for the admin panel
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FermentationWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fermentation: Fermentation,
    pub owner_name: Option<String>,
}

/// Appends `note` to `description`, separated by a blank line
pub fn append_note(description: &str, note: &str) -> String {
    let note = note.trim();
    if note.is_empty() {
        description.to_string()
    } else if description.trim().is_empty() {
        note.to_string()
    } else {
        format!("{}\n\n{}", description, note)
    }
}

impl Fermentation {
    pub async fn create(
        conn: &mut PgConnection,
        data: CreateFermentation,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Fermentation>(
            r#"
            INSERT INTO fermentations (user_id, ispindel_id, name, style, style_id,
                                       style_category, description, started_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
            RETURNING *
            "#,
        )
        .bind(data.user_id)
        .bind(data.ispindel_id)
        .bind(data.name)
        .bind(data.style)
        .bind(data.style_id)
        .bind(data.style_category)
        .bind(data.description)
        .bind(data.started_at)
        .fetch_one(&mut *conn)
        .await
    }

    /// Finds a fermentation only if it belongs to `user_id`
    pub async fn find_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Fermentation>(
            "SELECT * FROM fermentations WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// The user's fermentations, most recently started first
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Fermentation>(
            r#"
            SELECT * FROM fermentations
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY started_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_active_by_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM fermentations WHERE user_id = $1 AND is_active AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Whether a running fermentation already uses the device
    pub async fn device_in_use(
        conn: &mut PgConnection,
        ispindel_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM fermentations
                WHERE ispindel_id = $1 AND is_active AND deleted_at IS NULL
            )
            "#,
        )
        .bind(ispindel_id)
        .fetch_one(&mut *conn)
        .await
    }

    /// Ends the fermentation; `description` is the full new text
    pub async fn end(
        pool: &PgPool,
        id: Uuid,
        ended_at: DateTime<Utc>,
        description: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Fermentation>(
            r#"
            UPDATE fermentations
            SET ended_at = $2, is_active = FALSE, description = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ended_at)
        .bind(description)
        .fetch_one(pool)
        .await
    }

    /// Ends every running fermentation measured by a device that is going
    /// away and detaches the device. Returns the number of rows touched.
    pub async fn end_all_for_device(
        conn: &mut PgConnection,
        ispindel_id: Uuid,
        ended_at: DateTime<Utc>,
        note: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE fermentations
            SET ended_at = $2,
                is_active = FALSE,
                ispindel_id = NULL,
                description = CASE
                    WHEN btrim(description) = '' THEN $3
                    ELSE description || E'\n\n' || $3
                END,
                updated_at = NOW()
            WHERE ispindel_id = $1 AND is_active AND deleted_at IS NULL
            "#,
        )
        .bind(ispindel_id)
        .bind(ended_at)
        .bind(note)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE fermentations SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every fermentation with its owner, most recently started first
    pub async fn list_all_with_owner(
        pool: &PgPool,
    ) -> Result<Vec<FermentationWithOwner>, sqlx::Error> {
        sqlx::query_as::<_, FermentationWithOwner>(
            r#"
            SELECT f.*, u.name AS owner_name
            FROM fermentations f
            LEFT JOIN users u ON u.id = f.user_id
            WHERE f.deleted_at IS NULL
            ORDER BY f.started_at DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn delete_for_user(conn: &mut PgConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM fermentations WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM fermentations WHERE deleted_at IS NULL")
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_note() {
        assert_eq!(append_note("", "Dry hopped"), "Dry hopped");
        assert_eq!(append_note("Pale ale", "Dry hopped"), "Pale ale\n\nDry hopped");
        assert_eq!(append_note("Pale ale", "   "), "Pale ale");
        assert_eq!(append_note("  ", "note"), "note");
    }
}
