/// OAuth sign-in routes
///
/// # Endpoints
///
/// - `GET /auth/{google,piwo}/login` - Redirect to the provider
/// - `GET /auth/{google,piwo}/callback` - Finish the code flow and sign in

use crate::{
    app::AppState,
    error::{PageError, PageResult},
    oauth::{OAuthProvider, ProviderKind},
    routes::{auth::login_view, render},
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use ispindel_shared::{accounts, auth::cookie};
use serde::Deserialize;

/// Query string the provider redirects back with
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn google_login(State(state): State<AppState>) -> PageResult<Response> {
    start(&state, ProviderKind::Google)
}

pub async fn piwo_login(State(state): State<AppState>) -> PageResult<Response> {
    start(&state, ProviderKind::Piwo)
}

pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> PageResult<Response> {
    finish(&state, ProviderKind::Google, &headers, query).await
}

pub async fn piwo_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> PageResult<Response> {
    finish(&state, ProviderKind::Piwo, &headers, query).await
}

fn provider(state: &AppState, kind: ProviderKind) -> PageResult<&OAuthProvider> {
    state
        .oauth
        .get(kind)
        .ok_or_else(|| PageError::NotFound(format!("{} login is not configured", kind.display_name())))
}

fn start(state: &AppState, kind: ProviderKind) -> PageResult<Response> {
    let (url, csrf) = provider(state, kind)?.authorize_url();

    let state_cookie = cookie::session_cookie(
        cookie::OAUTH_STATE_COOKIE,
        csrf.secret(),
        cookie::OAUTH_STATE_MAX_AGE_SECS,
        state.config.api.production,
    );

    tracing::debug!(provider = kind.display_name(), "Redirecting to OAuth provider");

    Ok(([(header::SET_COOKIE, state_cookie)], Redirect::temporary(url.as_str())).into_response())
}

/// Login page with an error; the state cookie is dropped either way
fn failed(state: &AppState, message: String) -> PageResult<Response> {
    let page = render(login_view(state, Some(message), None, String::new()))?;
    Ok((
        [(header::SET_COOKIE, cookie::expired_cookie(cookie::OAUTH_STATE_COOKIE))],
        page,
    )
        .into_response())
}

/// Whether the callback carries the state we issued
fn state_matches(expected: Option<&str>, returned: Option<&str>) -> bool {
    matches!((expected, returned), (Some(e), Some(r)) if !e.is_empty() && e == r)
}

async fn finish(
    state: &AppState,
    kind: ProviderKind,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> PageResult<Response> {
    let provider = provider(state, kind)?;
    let name = kind.display_name();

    if let Some(error) = query.error {
        tracing::warn!(provider = name, error = %error, "OAuth provider returned an error");
        let detail = query.error_description.unwrap_or(error);
        return failed(state, format!("{} login failed: {}", name, detail));
    }

    let expected = cookie::read_cookie(headers, cookie::OAUTH_STATE_COOKIE);
    if !state_matches(expected.as_deref(), query.state.as_deref()) {
        tracing::warn!(provider = name, "OAuth state mismatch");
        return failed(state, "Login session expired or is invalid. Please try again.".to_string());
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return failed(state, format!("{} did not return an authorization code", name));
    };

    let access_token = match provider.exchange(code, &state.http).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(provider = name, error = %e, "OAuth code exchange failed");
            return failed(state, format!("Could not complete {} login", name));
        }
    };

    let profile = match provider.fetch_profile(&access_token, &state.http).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::error!(provider = name, error = %e, "Failed to fetch OAuth profile");
            return failed(state, format!("Could not read your {} profile", name));
        }
    };

    let user = match accounts::upsert_external(&state.db, profile).await {
        Ok(user) => user,
        Err(e) if e.is_client_error() => return failed(state, e.to_string()),
        Err(e) => return Err(e.into()),
    };

    let session = state.session_cookie(user.id)?;

    Ok((
        AppendHeaders([
            (header::SET_COOKIE, session),
            (header::SET_COOKIE, cookie::expired_cookie(cookie::OAUTH_STATE_COOKIE)),
        ]),
        Redirect::to("/dashboard"),
    )
        .into_response())
}
