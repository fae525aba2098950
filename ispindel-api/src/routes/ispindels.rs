/// Device management
///
/// # Endpoints
///
/// - `GET /ispindels` - List the user's devices
/// - `GET|POST /ispindels/new` - Register a device
/// - `GET /ispindels/:id` - Latest readings, chart and ingestion URL
/// - `GET|POST /ispindels/:id/edit` - Rename, describe, (de)activate
/// - `POST /ispindels/:id/regenerate-key` - JSON `{api_key}`
/// - `POST /ispindels/:id/delete` - JSON `{success}`, ends running fermentations

use crate::{
    app::AppState,
    error::{ApiResult, PageError, PageResult},
    middleware::auth::{ApiUser, CurrentUser},
    routes::{rejected, render},
    views::{chart_series, format_time, DeviceRow, IspindelDetailPage, IspindelFormPage, IspindelListPage},
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use ispindel_shared::{
    brewing::BrewingError,
    devices::{self, DeletedBy, MAX_DEVICES_PER_USER},
    models::{Ispindel, Measurement, User},
    telemetry::{is_inactive, report_inactive_devices},
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Readings shown on the device page
const DETAIL_READINGS: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct DeviceForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Checkbox; present when ticked
    pub is_active: Option<String>,
}

async fn find_device(state: &AppState, user: &User, id: Uuid) -> PageResult<Ispindel> {
    Ispindel::find_for_user(&state.db, id, user.id)
        .await?
        .ok_or_else(|| PageError::NotFound(BrewingError::DeviceNotFound.to_string()))
}

fn new_form(state: &AppState, user: &User, error: Option<String>, form: Option<DeviceForm>) -> IspindelFormPage {
    let form = form.unwrap_or(DeviceForm {
        name: String::new(),
        description: String::new(),
        is_active: Some("on".to_string()),
    });

    IspindelFormPage {
        nav: state.nav(Some(user)),
        title: "Add iSpindel".to_string(),
        action: "/ispindels/new".to_string(),
        error,
        name: form.name,
        description: form.description,
        is_active: true,
        editing: false,
    }
}

fn edit_form(state: &AppState, user: &User, device: &Ispindel, error: Option<String>) -> IspindelFormPage {
    IspindelFormPage {
        nav: state.nav(Some(user)),
        title: format!("Edit {}", device.name),
        action: format!("/ispindels/{}/edit", device.id),
        error,
        name: device.name.clone(),
        description: device.description.clone(),
        is_active: device.is_active,
        editing: true,
    }
}

pub async fn list(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> PageResult<Response> {
    let now = Utc::now();
    let devices = Ispindel::list_by_user(&state.db, user.id).await?;
    report_inactive_devices(&devices, now, &state.telemetry);

    let can_add = (devices.len() as i64) < MAX_DEVICES_PER_USER;
    let rows = devices
        .into_iter()
        .map(|ispindel| DeviceRow {
            silent: is_inactive(ispindel.last_seen, now, state.telemetry.inactivity_timeout),
            last_seen: ispindel.last_seen.as_ref().map(format_time),
            ispindel,
        })
        .collect();

    Ok(render(IspindelListPage {
        nav: state.nav(Some(&user)),
        devices: rows,
        max_devices: MAX_DEVICES_PER_USER,
        can_add,
    })?
    .into_response())
}

pub async fn new_page(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> PageResult<Response> {
    let error = if Ispindel::count_by_user(&state.db, user.id).await? >= MAX_DEVICES_PER_USER {
        Some(BrewingError::DeviceLimitReached { max: MAX_DEVICES_PER_USER }.to_string())
    } else {
        None
    };

    Ok(render(new_form(&state, &user, error, None))?.into_response())
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<DeviceForm>,
) -> PageResult<Response> {
    match devices::create_device(&state.db, user.id, &form.name, &form.description).await {
        Ok(device) => Ok(Redirect::to(&format!("/ispindels/{}", device.id)).into_response()),
        Err(e) if e.is_client_error() => rejected(new_form(&state, &user, Some(e.to_string()), Some(form))),
        Err(e) => Err(e.into()),
    }
}

pub async fn detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    let ispindel = find_device(&state, &user, id).await?;
    let readings = Measurement::latest_for_device(&state.db, ispindel.id, DETAIL_READINGS).await?;

    Ok(render(IspindelDetailPage {
        nav: state.nav(Some(&user)),
        chart_json: chart_series(&readings),
        endpoint_url: state.config.url(&format!("/api/ispindel/{}", ispindel.api_key)),
        generic_endpoint_url: state.config.url("/api/ispindel"),
        silent: is_inactive(ispindel.last_seen, Utc::now(), state.telemetry.inactivity_timeout),
        readings,
        ispindel,
    })?
    .into_response())
}

pub async fn edit_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    let device = find_device(&state, &user, id).await?;
    Ok(render(edit_form(&state, &user, &device, None))?.into_response())
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(form): Form<DeviceForm>,
) -> PageResult<Response> {
    let is_active = form.is_active.is_some();

    match devices::update_device(&state.db, user.id, id, &form.name, &form.description, is_active).await {
        Ok(device) => Ok(Redirect::to(&format!("/ispindels/{}", device.id)).into_response()),
        Err(BrewingError::NameRequired) => {
            let mut device = find_device(&state, &user, id).await?;
            device.description = form.description;
            device.is_active = is_active;
            let page = edit_form(&state, &user, &device, Some(BrewingError::NameRequired.to_string()));
            rejected(IspindelFormPage {
                name: form.name,
                ..page
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn regenerate_key(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let api_key = devices::regenerate_api_key(&state.db, user.id, id).await?;
    Ok(Json(json!({ "success": true, "api_key": api_key })))
}

pub async fn delete(
    State(state): State<AppState>,
    ApiUser(user): ApiUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let ended = devices::delete_device(&state.db, id, DeletedBy::Owner(user.id)).await?;
    Ok(Json(json!({ "success": true, "fermentations_ended": ended })))
}
