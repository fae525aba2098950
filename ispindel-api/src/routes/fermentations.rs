/// Fermentation pages
///
/// # Endpoints
///
/// - `GET /fermentations` - List with duration, device and last reading
/// - `GET|POST /fermentations/new` - Start a fermentation on a free device
/// - `GET /fermentations/:id` - Hourly chart, recent readings, start vs. now
/// - `GET /fermentations/:id/charts?period=all|1d|3d|7d` - Full chart
/// - `POST /fermentations/:id/end` - End with an optional comment
/// - `POST /fermentations/:id/delete` - Soft delete

use crate::{
    app::AppState,
    error::{PageError, PageResult},
    middleware::auth::CurrentUser,
    routes::{rejected, render},
    views::{
        chart_series, FermentationChartsPage, FermentationDetailPage, FermentationFormPage,
        FermentationListPage, FermentationRow, PeriodLink,
    },
};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use ispindel_shared::{
    brewing::{self, BrewingError, ChartPeriod, NewFermentation},
    devices,
    models::{Fermentation, Ispindel, Measurement, User},
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Readings listed under the detail chart
const RECENT_READINGS: usize = 15;

#[derive(Debug, Default, Deserialize)]
pub struct FermentationForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub style_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ispindel_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndForm {
    #[serde(default)]
    pub comment: String,
}

async fn find_fermentation(state: &AppState, user: &User, id: Uuid) -> PageResult<Fermentation> {
    Fermentation::find_for_user(&state.db, id, user.id)
        .await?
        .ok_or_else(|| PageError::NotFound(BrewingError::FermentationNotFound.to_string()))
}

pub async fn list(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> PageResult<Response> {
    let now = Utc::now();
    let fermentations = Fermentation::list_by_user(&state.db, user.id).await?;
    let device_names: HashMap<Uuid, String> = Ispindel::list_by_user(&state.db, user.id)
        .await?
        .into_iter()
        .map(|d| (d.id, d.name))
        .collect();

    let mut rows = Vec::with_capacity(fermentations.len());
    for fermentation in fermentations {
        let last_reading = match fermentation.ispindel_id.filter(|_| fermentation.is_active) {
            Some(ispindel_id) => Measurement::latest_for_device(&state.db, ispindel_id, 1)
                .await?
                .into_iter()
                .find(|m| m.timestamp >= fermentation.started_at),
            None => None,
        };

        rows.push(FermentationRow {
            duration: brewing::duration(&fermentation, now).to_string(),
            device_name: fermentation.ispindel_id.and_then(|id| device_names.get(&id).cloned()),
            last_reading,
            fermentation,
        });
    }

    Ok(render(FermentationListPage {
        nav: state.nav(Some(&user)),
        rows,
    })?
    .into_response())
}

async fn form_page(
    state: &AppState,
    user: &User,
    form: FermentationForm,
    error: Option<String>,
) -> PageResult<FermentationFormPage> {
    let devices = devices::available_devices(&state.db, user.id).await?;
    let busy_devices = devices::busy_devices(&state.db, user.id).await?;

    Ok(FermentationFormPage {
        nav: state.nav(Some(user)),
        error,
        name: form.name,
        style_id: form.style_id,
        description: form.description,
        ispindel_id: form.ispindel_id,
        devices,
        busy_devices,
        styles: state.styles.styles().to_vec(),
    })
}

pub async fn new_page(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> PageResult<Response> {
    Ok(render(form_page(&state, &user, FermentationForm::default(), None).await?)?.into_response())
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<FermentationForm>,
) -> PageResult<Response> {
    let input = NewFermentation {
        name: form.name.clone(),
        style_id: form.style_id.clone(),
        description: form.description.clone(),
        ispindel_id: form.ispindel_id.trim().parse::<Uuid>().ok(),
    };

    match brewing::create_fermentation(&state.db, user.id, input, &state.styles).await {
        Ok(fermentation) => Ok(Redirect::to(&format!("/fermentations/{}", fermentation.id)).into_response()),
        Err(e) if e.is_client_error() => rejected(form_page(&state, &user, form, Some(e.to_string())).await?),
        Err(e) => Err(e.into()),
    }
}

async fn detail_page(
    state: &AppState,
    user: &User,
    id: Uuid,
    error: Option<String>,
) -> PageResult<FermentationDetailPage> {
    let now = Utc::now();
    let fermentation = find_fermentation(state, user, id).await?;

    let device = match fermentation.ispindel_id {
        Some(ispindel_id) => Ispindel::find_by_id(&state.db, ispindel_id).await?,
        None => None,
    };

    let all = brewing::all_measurements(&state.db, &fermentation).await?;
    let hourly = brewing::hourly_recent(&state.db, &fermentation, now).await?;
    let first = brewing::first_measurements(&state.db, &fermentation).await?;

    Ok(FermentationDetailPage {
        nav: state.nav(Some(user)),
        device,
        duration: brewing::duration(&fermentation, now).to_string(),
        chart_json: chart_series(&hourly),
        recent: all.iter().take(RECENT_READINGS).cloned().collect(),
        baseline: brewing::baseline(&first),
        current: brewing::current(&all).cloned(),
        can_delete: brewing::can_delete(&fermentation, !all.is_empty()),
        error,
        fermentation,
    })
}

pub async fn detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    Ok(render(detail_page(&state, &user, id, None).await?)?.into_response())
}

pub async fn charts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ChartsQuery>,
) -> PageResult<Response> {
    let fermentation = find_fermentation(&state, &user, id).await?;
    let period = ChartPeriod::parse(query.period.as_deref().unwrap_or_default());

    let readings = period.filter(brewing::all_measurements(&state.db, &fermentation).await?, Utc::now());

    Ok(render(FermentationChartsPage {
        nav: state.nav(Some(&user)),
        fermentation,
        periods: PeriodLink::all(period),
        chart_json: chart_series(&readings),
        count: readings.len(),
    })?
    .into_response())
}

pub async fn end(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(form): Form<EndForm>,
) -> PageResult<Response> {
    match brewing::end_fermentation(&state.db, user.id, id, &form.comment).await {
        Ok(fermentation) => Ok(Redirect::to(&format!("/fermentations/{}", fermentation.id)).into_response()),
        Err(BrewingError::AlreadyEnded) => {
            rejected(detail_page(&state, &user, id, Some(BrewingError::AlreadyEnded.to_string())).await?)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    match brewing::delete_fermentation(&state.db, user.id, id).await {
        Ok(()) => Ok(Redirect::to("/fermentations").into_response()),
        Err(BrewingError::ActiveWithMeasurements) => {
            let error = BrewingError::ActiveWithMeasurements.to_string();
            rejected(detail_page(&state, &user, id, Some(error)).await?)
        }
        Err(e) => Err(e.into()),
    }
}
