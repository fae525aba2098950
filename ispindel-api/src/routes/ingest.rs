/// Telemetry ingestion
///
/// The iSpindel firmware posts JSON to a configurable URL. Two shapes are
/// accepted:
///
/// ```text
/// POST /api/ispindel/:api_key      (also /ispindel/:api_key)
/// POST /api/ispindel               key in X-API-KEY / API-KEY header,
///                                  or api_key / apikey / token body field
/// ```
///
/// A single object is stored as one reading, an array as a batch where
/// failing items are skipped. Plain-text bodies get a `200` with a note so
/// misconfigured devices do not retry forever.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use ispindel_shared::{
    models::Ispindel,
    telemetry::{self, Payload},
};
use serde_json::json;

const PLAIN_TEXT_NOTE: &str = "Received plain text instead of JSON. Readings must be sent as JSON.";

pub async fn receive_with_key(
    State(state): State<AppState>,
    Path(api_key): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let device = resolve_device(&state, &api_key).await?;
    let payload = telemetry::classify_body(&body);

    store(&state, &device, payload, &body).await
}

pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Response> {
    let payload = telemetry::classify_body(&body);

    let body_object = match &payload {
        Payload::Single(value) => Some(value),
        _ => None,
    };

    let Some(api_key) = telemetry::extract_api_key(&headers, body_object) else {
        tracing::warn!("Telemetry request without an API key");
        return Err(match payload {
            Payload::Malformed => ApiError::BadRequest("Invalid JSON payload".to_string()),
            _ => ApiError::BadRequest("Missing API key".to_string()),
        });
    };

    let device = resolve_device(&state, &api_key).await?;
    store(&state, &device, payload, &body).await
}

async fn resolve_device(state: &AppState, api_key: &str) -> ApiResult<Ispindel> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ApiError::BadRequest("Missing API key".to_string()));
    }

    match Ispindel::find_by_api_key(&state.db, api_key).await? {
        Some(device) => Ok(device),
        None => {
            tracing::warn!("Telemetry request with an unknown API key");
            Err(ApiError::Unauthorized("Invalid API key".to_string()))
        }
    }
}

async fn store(state: &AppState, device: &Ispindel, payload: Payload, raw: &[u8]) -> ApiResult<Response> {
    tracing::debug!(
        ispindel_id = %device.id,
        body = %String::from_utf8_lossy(raw),
        "Received telemetry payload"
    );

    let now = Utc::now();

    match payload {
        Payload::Single(value) => {
            let measurement =
                telemetry::record_reading(&state.db, device.id, &value, &state.telemetry, now).await?;

            Ok(Json(json!({
                "success": true,
                "message": "Data saved",
                "measurement": measurement,
                "time": now,
            }))
            .into_response())
        }
        Payload::Batch(items) => {
            let outcome = telemetry::record_batch(&state.db, device.id, &items, &state.telemetry, now).await;

            Ok(Json(json!({
                "success": true,
                "message": format!("Saved {} of {} readings", outcome.saved, outcome.total()),
                "count": outcome.saved,
                "failed": outcome.failed,
                "time": now,
            }))
            .into_response())
        }
        Payload::PlainText => {
            tracing::warn!(ispindel_id = %device.id, "Received plain text telemetry");
            Ok((StatusCode::OK, PLAIN_TEXT_NOTE).into_response())
        }
        Payload::Malformed => {
            tracing::warn!(ispindel_id = %device.id, "Received malformed telemetry JSON");
            Err(ApiError::BadRequest("Invalid JSON payload".to_string()))
        }
    }
}
