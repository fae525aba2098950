/// Fermentation rules
///
/// A fermentation follows one device from `started_at` until it is ended.
/// Its readings are not stored against the fermentation: they are the
/// device's readings inside that time window.

use crate::models::{CreateFermentation, Fermentation, Ispindel, Measurement};
use crate::styles::StyleCatalog;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Readings averaged for the starting gravity and temperature
pub const BASELINE_SAMPLE_SIZE: i64 = 3;

/// How far back the hourly detail series reaches
pub const HOURLY_WINDOW_HOURS: i64 = 12;

/// Errors raised by fermentation and device rules
///
/// The messages are shown to users as-is.
#[derive(Debug, thiserror::Error)]
pub enum BrewingError {
    #[error("Name is required")]
    NameRequired,

    #[error("Selecting an iSpindel device is required")]
    DeviceRequired,

    #[error("iSpindel device not found")]
    DeviceNotFound,

    #[error("This iSpindel is already used by an active fermentation")]
    DeviceInUse,

    #[error("You can register at most {max} iSpindel devices")]
    DeviceLimitReached { max: i64 },

    #[error("Fermentation not found")]
    FermentationNotFound,

    #[error("Fermentation has already ended")]
    AlreadyEnded,

    #[error("An active fermentation with measurements cannot be deleted - end it first")]
    ActiveWithMeasurements,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BrewingError {
    /// Whether the error is caused by user input rather than the system
    pub fn is_client_error(&self) -> bool {
        !matches!(self, BrewingError::Database(_))
    }
}

/// Elapsed fermentation time split into calendar parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FermentationDuration {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl FermentationDuration {
    pub fn from_duration(elapsed: Duration) -> Self {
        let total_minutes = elapsed.num_minutes().max(0);
        Self {
            days: total_minutes / (24 * 60),
            hours: (total_minutes / 60) % 24,
            minutes: total_minutes % 60,
        }
    }
}

impl fmt::Display for FermentationDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            let unit = if self.days == 1 { "day" } else { "days" };
            if self.hours > 0 {
                write!(f, "{} {} {} h", self.days, unit, self.hours)
            } else {
                write!(f, "{} {}", self.days, unit)
            }
        } else if self.hours > 0 {
            if self.minutes > 0 {
                write!(f, "{} h {} min", self.hours, self.minutes)
            } else {
                write!(f, "{} h", self.hours)
            }
        } else {
            write!(f, "{} min", self.minutes)
        }
    }
}

/// Time from start until `ended_at`, or until `now` while still running
pub fn duration(fermentation: &Fermentation, now: DateTime<Utc>) -> FermentationDuration {
    let end = match (fermentation.is_active, fermentation.ended_at) {
        (false, Some(ended_at)) => ended_at,
        _ => now,
    };
    FermentationDuration::from_duration(end - fermentation.started_at)
}

/// Device and time range whose readings belong to a fermentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementWindow {
    pub ispindel_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
}

/// `None` once the device was deleted
pub fn measurement_window(fermentation: &Fermentation) -> Option<MeasurementWindow> {
    let ispindel_id = fermentation.ispindel_id?;
    let to = if fermentation.is_active {
        None
    } else {
        fermentation.ended_at
    };

    Some(MeasurementWindow {
        ispindel_id,
        from: fermentation.started_at,
        to,
    })
}

/// Every reading of the fermentation, newest first
pub async fn all_measurements(
    pool: &PgPool,
    fermentation: &Fermentation,
) -> Result<Vec<Measurement>, sqlx::Error> {
    match measurement_window(fermentation) {
        Some(w) => Measurement::in_window(pool, w.ispindel_id, w.from, w.to).await,
        None => Ok(Vec::new()),
    }
}

/// One reading per clock hour over the last twelve hours of the window,
/// oldest first
pub async fn hourly_recent(
    pool: &PgPool,
    fermentation: &Fermentation,
    now: DateTime<Utc>,
) -> Result<Vec<Measurement>, sqlx::Error> {
    let Some(window) = measurement_window(fermentation) else {
        return Ok(Vec::new());
    };

    let to = window.to.unwrap_or(now);
    let from = window.from.max(to - Duration::hours(HOURLY_WINDOW_HOURS));
    if from > to {
        return Ok(Vec::new());
    }

    Measurement::hourly(pool, window.ispindel_id, from, to).await
}

/// The first readings since the fermentation started, oldest first
pub async fn first_measurements(
    pool: &PgPool,
    fermentation: &Fermentation,
) -> Result<Vec<Measurement>, sqlx::Error> {
    match measurement_window(fermentation) {
        Some(w) => {
            Measurement::first_n_since(pool, w.ispindel_id, w.from, w.to, BASELINE_SAMPLE_SIZE).await
        }
        None => Ok(Vec::new()),
    }
}

/// Starting values of a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub gravity: f64,
    pub temperature: f64,
}

/// Average gravity and temperature over the first (up to) three readings
pub fn baseline(readings: &[Measurement]) -> Option<Baseline> {
    let sample: Vec<&Measurement> = readings.iter().take(BASELINE_SAMPLE_SIZE as usize).collect();
    if sample.is_empty() {
        return None;
    }

    let n = sample.len() as f64;
    Some(Baseline {
        gravity: sample.iter().map(|m| m.gravity).sum::<f64>() / n,
        temperature: sample.iter().map(|m| m.temperature).sum::<f64>() / n,
    })
}

/// Newest reading of a newest-first list
pub fn current(latest_first: &[Measurement]) -> Option<&Measurement> {
    latest_first.first()
}

/// Ended batches can always go; running ones only while they have no data
pub fn can_delete(fermentation: &Fermentation, has_measurements: bool) -> bool {
    !fermentation.is_active || !has_measurements
}

/// Range selector of the chart page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartPeriod {
    #[default]
    All,
    Day,
    ThreeDays,
    Week,
}

impl ChartPeriod {
    /// Parses `all`, `1d`, `3d` or `7d`; anything else means `All`
    pub fn parse(value: &str) -> Self {
        match value {
            "1d" => ChartPeriod::Day,
            "3d" => ChartPeriod::ThreeDays,
            "7d" => ChartPeriod::Week,
            _ => ChartPeriod::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartPeriod::All => "all",
            ChartPeriod::Day => "1d",
            ChartPeriod::ThreeDays => "3d",
            ChartPeriod::Week => "7d",
        }
    }

    pub fn span(&self) -> Option<Duration> {
        match self {
            ChartPeriod::All => None,
            ChartPeriod::Day => Some(Duration::days(1)),
            ChartPeriod::ThreeDays => Some(Duration::days(3)),
            ChartPeriod::Week => Some(Duration::days(7)),
        }
    }

    /// Keeps readings with `timestamp >= now - span`
    pub fn filter(&self, readings: Vec<Measurement>, now: DateTime<Utc>) -> Vec<Measurement> {
        match self.span() {
            None => readings,
            Some(span) => {
                let cutoff = now - span;
                readings.into_iter().filter(|m| m.timestamp >= cutoff).collect()
            }
        }
    }
}

/// Form input for a new fermentation
#[derive(Debug, Clone, Default)]
pub struct NewFermentation {
    pub name: String,
    pub style_id: String,
    pub description: String,
    pub ispindel_id: Option<Uuid>,
}

/// Starts a fermentation on one of the user's devices
///
/// The device must be active, owned by `user_id` and free. The check and
/// the insert share a transaction with the device row locked, so two
/// concurrent requests cannot claim the same device.
pub async fn create_fermentation(
    pool: &PgPool,
    user_id: Uuid,
    input: NewFermentation,
    styles: &StyleCatalog,
) -> Result<Fermentation, BrewingError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(BrewingError::NameRequired);
    }
    let ispindel_id = input.ispindel_id.ok_or(BrewingError::DeviceRequired)?;

    let mut tx = pool.begin().await?;

    let device = Ispindel::lock(&mut *tx, ispindel_id)
        .await?
        .filter(|d| d.user_id == user_id && d.is_active)
        .ok_or(BrewingError::DeviceNotFound)?;

    if Fermentation::device_in_use(&mut *tx, device.id).await? {
        return Err(BrewingError::DeviceInUse);
    }

    let style_id = input.style_id.trim();
    let (style, style_category) = styles
        .find(style_id)
        .map(|s| (s.label.clone(), s.category.clone()))
        .unwrap_or_default();

    let fermentation = Fermentation::create(
        &mut *tx,
        CreateFermentation {
            user_id,
            ispindel_id: device.id,
            name: name.to_string(),
            style,
            style_id: style_id.to_string(),
            style_category,
            description: input.description.trim().to_string(),
            started_at: Utc::now(),
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        user_id = %user_id,
        fermentation_id = %fermentation.id,
        ispindel_id = %device.id,
        "Started fermentation"
    );

    Ok(fermentation)
}

/// Ends a running fermentation, appending `comment` to its description
pub async fn end_fermentation(
    pool: &PgPool,
    user_id: Uuid,
    fermentation_id: Uuid,
    comment: &str,
) -> Result<Fermentation, BrewingError> {
    let fermentation = Fermentation::find_for_user(pool, fermentation_id, user_id)
        .await?
        .ok_or(BrewingError::FermentationNotFound)?;

    if !fermentation.is_active {
        return Err(BrewingError::AlreadyEnded);
    }

    let description = crate::models::fermentation::append_note(&fermentation.description, comment);
    let ended = Fermentation::end(pool, fermentation.id, Utc::now(), &description).await?;

    info!(user_id = %user_id, fermentation_id = %ended.id, "Ended fermentation");

    Ok(ended)
}

/// Soft-deletes a fermentation unless it is running and has data
pub async fn delete_fermentation(
    pool: &PgPool,
    user_id: Uuid,
    fermentation_id: Uuid,
) -> Result<(), BrewingError> {
    let fermentation = Fermentation::find_for_user(pool, fermentation_id, user_id)
        .await?
        .ok_or(BrewingError::FermentationNotFound)?;

    let has_measurements = match measurement_window(&fermentation) {
        Some(w) => Measurement::exists_in_window(pool, w.ispindel_id, w.from, w.to).await?,
        None => false,
    };

    if !can_delete(&fermentation, has_measurements) {
        return Err(BrewingError::ActiveWithMeasurements);
    }

    Fermentation::soft_delete(pool, fermentation.id).await?;

    info!(user_id = %user_id, fermentation_id = %fermentation.id, "Deleted fermentation");

    Ok(())
}
