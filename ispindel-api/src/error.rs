/// Error handling for the web server
///
/// Two error types map failures to HTTP responses:
///
/// - [`ApiError`] for JSON endpoints (telemetry ingestion, key
///   regeneration, device deletion, health). Renders
///   `{"error": code, "message": msg}`.
/// - [`PageError`] for HTML pages. Renders the `error.html` template with
///   the status code.
///
/// # Example
///
/// ```
/// use ispindel_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::NotFound("iSpindel not found".to_string()));
///     }
///     Ok(Json(json!({ "success": true })))
/// }
/// ```

use crate::views::ErrorPage;
use askama::Template;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use ispindel_shared::{
    accounts::AccountError,
    auth::{jwt::JwtError, password::PasswordError},
    brewing::BrewingError,
    telemetry::TelemetryError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// HTML page result type alias
pub type PageResult<T> = Result<T, PageError>;

/// JSON endpoint error
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Not found (404)
    NotFound(String),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Reading could not be stored (500); the cause is sent to the device
    SaveFailed(String),

    /// Internal server error (500)
    InternalError(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::RateLimitExceeded { message, .. } => write!(f, "Rate limit exceeded: {}", message),
            ApiError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::RateLimitExceeded { message, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", message)
            }
            ApiError::SaveFailed(msg) => {
                tracing::error!("Save failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "save_failed", msg)
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(secs));
        }
        response
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Session expired".to_string()),
            JwtError::InvalidIssuer { .. } => ApiError::Unauthorized("Invalid token issuer".to_string()),
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<BrewingError> for ApiError {
    fn from(err: BrewingError) -> Self {
        match err {
            BrewingError::DeviceNotFound | BrewingError::FermentationNotFound => {
                ApiError::NotFound(err.to_string())
            }
            BrewingError::Database(e) => e.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::InternalError(err.to_string())
        }
    }
}

impl From<TelemetryError> for ApiError {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::TooFrequent { retry_after_secs, .. } => ApiError::RateLimitExceeded {
                retry_after: retry_after_secs.max(1) as u64,
                message: err.to_string(),
            },
            TelemetryError::DeviceNotFound => ApiError::Unauthorized("Invalid API key".to_string()),
            TelemetryError::NotAnObject => ApiError::BadRequest(err.to_string()),
            TelemetryError::Database(e) => ApiError::SaveFailed(format!("Failed to save data: {}", e)),
        }
    }
}

/// HTML page error
#[derive(Debug)]
pub enum PageError {
    /// Bad request (400)
    BadRequest(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Internal server error (500)
    Internal(String),
}

impl PageError {
    fn status(&self) -> StatusCode {
        match self {
            PageError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PageError::Forbidden(_) => StatusCode::FORBIDDEN,
            PageError::NotFound(_) => StatusCode::NOT_FOUND,
            PageError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            PageError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            PageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            PageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for PageError {}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            PageError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred. Please try again later.".to_string()
            }
            PageError::BadRequest(msg) | PageError::Forbidden(msg) | PageError::NotFound(msg) => msg,
        };

        let page = ErrorPage {
            nav: Default::default(),
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        };

        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                (status, status.canonical_reason().unwrap_or("Error")).into_response()
            }
        }
    }
}

impl From<sqlx::Error> for PageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => PageError::NotFound("Not found".to_string()),
            _ => PageError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<askama::Error> for PageError {
    fn from(err: askama::Error) -> Self {
        PageError::Internal(format!("Template error: {}", err))
    }
}

impl From<PasswordError> for PageError {
    fn from(err: PasswordError) -> Self {
        PageError::Internal(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for PageError {
    fn from(err: JwtError) -> Self {
        PageError::Internal(format!("Session token error: {}", err))
    }
}

impl From<BrewingError> for PageError {
    fn from(err: BrewingError) -> Self {
        match err {
            BrewingError::DeviceNotFound | BrewingError::FermentationNotFound => {
                PageError::NotFound(err.to_string())
            }
            BrewingError::Database(e) => e.into(),
            other => PageError::BadRequest(other.to_string()),
        }
    }
}

impl From<AccountError> for PageError {
    fn from(err: AccountError) -> Self {
        if err.is_client_error() {
            PageError::BadRequest(err.to_string())
        } else {
            PageError::Internal(err.to_string())
        }
    }
}
