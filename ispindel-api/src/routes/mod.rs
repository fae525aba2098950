/// Route handlers
///
/// This module contains all route handlers organized by area:
///
/// - `health`: Health check endpoint
/// - `auth`: Password login, registration, activation and password reset
/// - `oauth`: Google and piwo.org sign-in
/// - `dashboard`: Landing page, dashboard and contact form
/// - `ispindels`: Device management
/// - `fermentations`: Fermentations and charts
/// - `ingest`: Telemetry ingestion from the devices
/// - `settings`: Password change and account deletion
/// - `admin`: Admin panel

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod fermentations;
pub mod health;
pub mod ingest;
pub mod ispindels;
pub mod oauth;
pub mod settings;

use crate::error::PageResult;
use askama::Template;
use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};

/// Renders a page template
pub(crate) fn render<T: Template>(page: T) -> PageResult<Html<String>> {
    Ok(Html(page.render()?))
}

/// Renders a page with a non-200 status
pub(crate) fn render_status<T: Template>(status: StatusCode, page: T) -> PageResult<Response> {
    Ok((status, render(page)?).into_response())
}

/// Re-renders a form after a validation or business-rule failure
pub(crate) fn rejected<T: Template>(page: T) -> PageResult<Response> {
    render_status(StatusCode::BAD_REQUEST, page)
}

/// 400 when the page carries an error, 200 otherwise
pub(crate) fn render_outcome<T: Template>(page: T, failed: bool) -> PageResult<Response> {
    if failed {
        rejected(page)
    } else {
        Ok(render(page)?.into_response())
    }
}

/// Redirect that also sets (or clears) a cookie
pub(crate) fn redirect_with_cookie(to: &str, cookie: String) -> Response {
    ([(header::SET_COOKIE, cookie)], Redirect::to(to)).into_response()
}

/// Empty form fields count as absent
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// First message of a failed `validator` check, for inline form errors
pub(crate) fn validation_message(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errors| errors.iter())
        .find_map(|error| error.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Validation failed".to_string())
}
