/// Account settings: password change and account deletion.

use crate::{
    app::AppState,
    error::PageResult,
    middleware::auth::CurrentUser,
    routes::{non_empty, redirect_with_cookie, rejected, render},
    views::SettingsPage,
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use ispindel_shared::{accounts, auth::cookie, models::User};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsQuery {
    pub changed: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountForm {
    pub password: Option<String>,
}

fn settings_page(state: &AppState, user: User, error: Option<String>, notice: Option<String>) -> SettingsPage {
    SettingsPage {
        nav: state.nav(Some(&user)),
        has_password: user.password_hash.is_some(),
        version: ispindel_shared::VERSION,
        user,
        error,
        notice,
    }
}

pub async fn page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<SettingsQuery>,
) -> PageResult<Response> {
    let notice = (query.changed.as_deref() == Some("true")).then(|| "Your password has been changed.".to_string());
    Ok(render(settings_page(&state, user, None, notice))?.into_response())
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> PageResult<Response> {
    match accounts::change_password(
        &state.db,
        &user,
        &form.current_password,
        &form.new_password,
        &form.confirm_password,
    )
    .await
    {
        Ok(()) => Ok(Redirect::to("/settings?changed=true").into_response()),
        Err(e) if e.is_client_error() => rejected(settings_page(&state, user, Some(e.to_string()), None)),
        Err(e) => Err(e.into()),
    }
}

/// Deletes the account and everything it owns, then signs out
///
/// Accounts with a password must confirm it; OAuth-only accounts have
/// nothing to confirm.
pub async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<DeleteAccountForm>,
) -> PageResult<Response> {
    let password = match (&user.password_hash, non_empty(form.password)) {
        (Some(_), Some(password)) => Some(password),
        (Some(_), None) => Some(String::new()),
        (None, _) => None,
    };

    match accounts::delete_account(&state.db, &user, password.as_deref()).await {
        Ok(()) => Ok(redirect_with_cookie(
            "/auth/login",
            cookie::expired_cookie(cookie::SESSION_COOKIE),
        )),
        Err(e) if e.is_client_error() => rejected(settings_page(&state, user, Some(e.to_string()), None)),
        Err(e) => Err(e.into()),
    }
}
