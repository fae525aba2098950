/// Telemetry ingestion
///
/// An iSpindel wakes up, POSTs one JSON document and goes back to sleep:
///
/// ```json
/// {"name":"1234567/Fermenter 1","ID":1234567,"angle":52.1,"temperature":19.5,
///  "temp_units":"C","battery":3.98,"gravity":1.048,"interval":900,"RSSI":-71}
/// ```
///
/// Some firmware builds and HTTP bridges send arrays, numbers as strings or
/// plain text, so parsing here is deliberately lenient. The one hard rule is
/// the per-device minimum interval: a reading that arrives sooner than
/// `min_interval` after the previous stored one is rejected.

use crate::models::{Ispindel, Measurement, NewMeasurement};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default minimum gap between stored readings of one device (seconds)
pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 900;

/// Default silence after which a device is reported inactive (hours)
pub const DEFAULT_INACTIVITY_TIMEOUT_HOURS: i64 = 6;

/// Header names checked, in order, by the key-less ingestion endpoint
pub const API_KEY_HEADERS: [&str; 2] = ["X-API-KEY", "API-KEY"];

/// Body fields checked, in order, by the key-less ingestion endpoint
pub const API_KEY_FIELDS: [&str; 3] = ["api_key", "apikey", "token"];

/// Ingestion tunables
#[derive(Debug, Clone, Copy)]
pub struct TelemetrySettings {
    pub min_interval: Duration,
    pub inactivity_timeout: Duration,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::seconds(DEFAULT_MIN_INTERVAL_SECS),
            inactivity_timeout: Duration::hours(DEFAULT_INACTIVITY_TIMEOUT_HOURS),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Reading arrived before the minimum interval elapsed
    #[error("measurements too frequent - minimum interval between readings is {min_interval_secs} seconds")]
    TooFrequent {
        min_interval_secs: i64,
        retry_after_secs: i64,
    },

    /// Device vanished between lookup and insert
    #[error("device not found")]
    DeviceNotFound,

    /// Array element that is not a JSON object
    #[error("reading is not a JSON object")]
    NotAnObject,

    #[error("failed to store measurement: {0}")]
    Database(#[from] sqlx::Error),
}

/// Shape of an ingestion body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(Value),
    Batch(Vec<Value>),
    /// Non-empty body that does not open with `{` or `[`, i.e. not even an attempt at JSON
    PlainText,
    Malformed,
}

/// Sorts a raw body into one of the [`Payload`] shapes
pub fn classify_body(body: &[u8]) -> Payload {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(items)) => Payload::Batch(items),
        Ok(value @ Value::Object(_)) => Payload::Single(value),
        _ => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim_start();
            if !body.is_empty() && !text.starts_with('{') && !text.starts_with('[') {
                Payload::PlainText
            } else {
                Payload::Malformed
            }
        }
    }
}

/// Finds the API key for the key-less endpoint
///
/// Headers win over body fields. Empty values are skipped.
pub fn extract_api_key(headers: &HeaderMap, body: Option<&Value>) -> Option<String> {
    API_KEY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let body = body?;
            API_KEY_FIELDS
                .iter()
                .filter_map(|field| body.get(*field).and_then(Value::as_str))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        })
}

/// Fields extracted from one reading
///
/// Missing or unparsable fields stay at their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    pub name: Option<String>,
    pub device_id: Option<String>,
    pub angle: f64,
    pub temperature: f64,
    pub temp_units: Option<String>,
    pub battery: f64,
    pub gravity: f64,
    pub interval: i32,
    pub rssi: i32,
}

impl Reading {
    pub fn from_json(value: &Value) -> Self {
        Self {
            name: string_field(value, "name"),
            device_id: value.get("ID").and_then(device_id),
            angle: number_field(value, "angle").unwrap_or_default(),
            temperature: number_field(value, "temperature").unwrap_or_default(),
            temp_units: string_field(value, "temp_units"),
            battery: number_field(value, "battery").unwrap_or_default(),
            gravity: number_field(value, "gravity").unwrap_or_default(),
            interval: number_field(value, "interval").map(to_i32).unwrap_or_default(),
            rssi: number_field(value, "RSSI").map(to_i32).unwrap_or_default(),
        }
    }

    fn into_new_measurement(self, ispindel_id: Uuid) -> NewMeasurement {
        NewMeasurement {
            ispindel_id,
            device_id: self.device_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            angle: self.angle,
            temperature: self.temperature,
            temp_units: self.temp_units.unwrap_or_else(|| "C".to_string()),
            battery: self.battery,
            gravity: self.gravity,
            reading_interval: self.interval,
            rssi: self.rssi,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// JSON number or numeric string
fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn to_i32(n: f64) -> i32 {
    n.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Chip id as text without a fractional part
fn device_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| format!("{:.0}", f)),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Device name from the firmware's `"ID/name"` string
///
/// ```
/// use ispindel_shared::telemetry::display_name;
///
/// assert_eq!(display_name("1234567/Fermenter").as_deref(), Some("Fermenter"));
/// assert_eq!(display_name("Fermenter").as_deref(), Some("Fermenter"));
/// assert_eq!(display_name(""), None);
/// ```
pub fn display_name(raw: &str) -> Option<String> {
    let name = match raw.split_once('/') {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest),
        None => raw,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Whether enough time has passed since `last`
pub fn interval_elapsed(last: DateTime<Utc>, now: DateTime<Utc>, min_interval: Duration) -> bool {
    now - last >= min_interval
}

/// Whether a device has been silent for at least `timeout`
///
/// A device that never reported is not considered inactive.
pub fn is_inactive(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>, timeout: Duration) -> bool {
    last_seen.map_or(false, |seen| now - seen >= timeout)
}

/// Logs a warning for every silent device in `devices`
pub fn report_inactive_devices(devices: &[Ispindel], now: DateTime<Utc>, settings: &TelemetrySettings) {
    for device in devices
        .iter()
        .filter(|d| is_inactive(d.last_seen, now, settings.inactivity_timeout))
    {
        warn!(
            ispindel_id = %device.id,
            name = %device.name,
            last_seen = ?device.last_seen,
            timeout_hours = settings.inactivity_timeout.num_hours(),
            "Device has not reported within the inactivity timeout"
        );
    }
}

/// Stores one reading for a device
///
/// Runs in a single transaction: the device row is locked, the previous
/// reading is checked against the minimum interval, the new reading is
/// inserted and the device's `last_seen`, `device_id` and `name` are
/// refreshed.
///
/// # Errors
///
/// - `TelemetryError::TooFrequent` if the previous reading is too recent
/// - `TelemetryError::NotAnObject` if `payload` is not a JSON object
/// - `TelemetryError::Database` for persistence failures
pub async fn record_reading(
    pool: &PgPool,
    ispindel_id: Uuid,
    payload: &Value,
    settings: &TelemetrySettings,
    now: DateTime<Utc>,
) -> Result<Measurement, TelemetryError> {
    if !payload.is_object() {
        return Err(TelemetryError::NotAnObject);
    }

    let reading = Reading::from_json(payload);
    debug!(ispindel_id = %ispindel_id, ?reading, "Parsed telemetry reading");

    let mut tx = pool.begin().await?;

    Ispindel::lock(&mut *tx, ispindel_id)
        .await?
        .ok_or(TelemetryError::DeviceNotFound)?;

    if let Some(last) = Measurement::last_for_device(&mut *tx, ispindel_id).await? {
        if !interval_elapsed(last.timestamp, now, settings.min_interval) {
            let retry_after = (last.timestamp + settings.min_interval - now).num_seconds().max(1);
            warn!(
                ispindel_id = %ispindel_id,
                last_reading = %last.timestamp,
                retry_after_secs = retry_after,
                "Rejected reading: minimum interval not elapsed"
            );
            return Err(TelemetryError::TooFrequent {
                min_interval_secs: settings.min_interval.num_seconds(),
                retry_after_secs: retry_after,
            });
        }
    }

    let device_id = reading.device_id.clone();
    let name = reading.name.as_deref().and_then(display_name);

    let measurement = Measurement::insert(&mut *tx, reading.into_new_measurement(ispindel_id), now).await?;

    Ispindel::record_contact(&mut *tx, ispindel_id, now, device_id.as_deref(), name.as_deref()).await?;

    tx.commit().await?;

    info!(
        ispindel_id = %ispindel_id,
        measurement_id = measurement.id,
        gravity = measurement.gravity,
        temperature = measurement.temperature,
        "Stored telemetry reading"
    );

    Ok(measurement)
}

/// Outcome of a batch upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub saved: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.saved + self.failed
    }
}

/// Stores each reading of a batch, skipping the ones that fail
pub async fn record_batch(
    pool: &PgPool,
    ispindel_id: Uuid,
    items: &[Value],
    settings: &TelemetrySettings,
    now: DateTime<Utc>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for item in items {
        match record_reading(pool, ispindel_id, item, settings, now).await {
            Ok(_) => outcome.saved += 1,
            Err(e) => {
                outcome.failed += 1;
                warn!(ispindel_id = %ispindel_id, error = %e, "Skipped reading in batch");
            }
        }
    }

    info!(
        ispindel_id = %ispindel_id,
        saved = outcome.saved,
        failed = outcome.failed,
        "Processed telemetry batch"
    );

    outcome
}
