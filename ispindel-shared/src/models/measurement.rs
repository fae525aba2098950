/// Telemetry readings
///
/// Rows are append-only. `timestamp` is the server clock at the moment the
/// reading was accepted (the firmware has no reliable clock).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE measurements (
///     id BIGSERIAL PRIMARY KEY,
///     ispindel_id UUID NOT NULL REFERENCES ispindels (id) ON DELETE CASCADE,
///     device_id VARCHAR(255) NOT NULL DEFAULT '',
///     name VARCHAR(255) NOT NULL DEFAULT '',
///     angle DOUBLE PRECISION NOT NULL DEFAULT 0,
///     temperature DOUBLE PRECISION NOT NULL DEFAULT 0,
///     temp_units VARCHAR(8) NOT NULL DEFAULT 'C',
///     battery DOUBLE PRECISION NOT NULL DEFAULT 0,
///     gravity DOUBLE PRECISION NOT NULL DEFAULT 0,
///     reading_interval INTEGER NOT NULL DEFAULT 0,
///     rssi INTEGER NOT NULL DEFAULT 0,
///     timestamp TIMESTAMPTZ NOT NULL,
///     received_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Default page size for "latest readings" lists
pub const DEFAULT_LATEST_LIMIT: i64 = 10;

/// One stored reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Measurement {
    pub id: i64,
    pub ispindel_id: Uuid,
    pub device_id: String,
    pub name: String,
    pub angle: f64,
    pub temperature: f64,
    pub temp_units: String,
    pub battery: f64,
    pub gravity: f64,
    /// Sleep interval the firmware reported, in seconds
    #[serde(rename = "interval")]
    pub reading_interval: i32,
    pub rssi: i32,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Values for a new row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMeasurement {
    pub ispindel_id: Uuid,
    pub device_id: String,
    pub name: String,
    pub angle: f64,
    pub temperature: f64,
    pub temp_units: String,
    pub battery: f64,
    pub gravity: f64,
    pub reading_interval: i32,
    pub rssi: i32,
}

impl Measurement {
    /// Inserts a reading stamped with `at`
    pub async fn insert(
        conn: &mut PgConnection,
        data: NewMeasurement,
        at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Measurement>(
            r#"
            INSERT INTO measurements (ispindel_id, device_id, name, angle, temperature,
                                      temp_units, battery, gravity, reading_interval, rssi,
                                      timestamp, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(data.ispindel_id)
        .bind(data.device_id)
        .bind(data.name)
        .bind(data.angle)
        .bind(data.temperature)
        .bind(data.temp_units)
        .bind(data.battery)
        .bind(data.gravity)
        .bind(data.reading_interval)
        .bind(data.rssi)
        .bind(at)
        .fetch_one(&mut *conn)
        .await
    }

    /// Most recent reading of a device
    pub async fn last_for_device(
        conn: &mut PgConnection,
        ispindel_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT * FROM measurements
            WHERE ispindel_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(ispindel_id)
        .fetch_optional(&mut *conn)
        .await
    }

    /// Newest readings first. A non-positive `limit` falls back to
    /// [`DEFAULT_LATEST_LIMIT`].
    pub async fn latest_for_device(
        pool: &PgPool,
        ispindel_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let limit = if limit <= 0 { DEFAULT_LATEST_LIMIT } else { limit };

        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT * FROM measurements
            WHERE ispindel_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(ispindel_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Readings with `from <= timestamp <= to`, newest first
    pub async fn in_window(
        pool: &PgPool,
        ispindel_id: Uuid,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT * FROM measurements
            WHERE ispindel_id = $1
              AND timestamp >= $2
              AND ($3::TIMESTAMPTZ IS NULL OR timestamp <= $3)
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(ispindel_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// First `n` readings at or after `since`, oldest first
    pub async fn first_n_since(
        pool: &PgPool,
        ispindel_id: Uuid,
        since: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
        n: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT * FROM measurements
            WHERE ispindel_id = $1
              AND timestamp >= $2
              AND ($3::TIMESTAMPTZ IS NULL OR timestamp <= $3)
            ORDER BY timestamp ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(ispindel_id)
        .bind(since)
        .bind(to)
        .bind(n)
        .fetch_all(pool)
        .await
    }

    /// Earliest reading in each clock hour of `[from, to]`, oldest first
    pub async fn hourly(
        pool: &PgPool,
        ispindel_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (date_trunc('hour', timestamp)) *
                FROM measurements
                WHERE ispindel_id = $1 AND timestamp >= $2 AND timestamp <= $3
                ORDER BY date_trunc('hour', timestamp), timestamp ASC, id ASC
            ) hourly
            ORDER BY timestamp ASC
            "#,
        )
        .bind(ispindel_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Removes the readings of every device a user owns
    pub async fn delete_for_user(conn: &mut PgConnection, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM measurements WHERE ispindel_id IN (SELECT id FROM ispindels WHERE user_id = $1)",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Whether any reading falls in `[from, to]`
    pub async fn exists_in_window(
        pool: &PgPool,
        ispindel_id: Uuid,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM measurements
                WHERE ispindel_id = $1
                  AND timestamp >= $2
                  AND ($3::TIMESTAMPTZ IS NULL OR timestamp <= $3)
            )
            "#,
        )
        .bind(ispindel_id)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await
    }
}
