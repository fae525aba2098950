/// Password authentication pages
///
/// # Endpoints
///
/// - `GET|POST /auth/login` - Sign in, sets the session cookie
/// - `GET|POST /auth/register` - Create an account and mail the activation link
/// - `GET /auth/logout` - Clear the session cookie
/// - `GET /auth/activate?token=` - Activate an account
/// - `GET|POST /auth/resend-activation` - Mail a fresh activation link
/// - `GET|POST /auth/forgot-password` - Mail a password reset link
/// - `GET|POST /auth/reset-password` - Set a new password from the link

use crate::{
    app::AppState,
    error::PageResult,
    middleware::auth::MaybeUser,
    routes::{redirect_with_cookie, rejected, render, render_outcome, validation_message},
    views::{ForgotPasswordPage, LoginPage, MessagePage, RegisterPage, ResendActivationPage, ResetPasswordPage},
};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use ispindel_shared::{
    accounts::{self, AccountError, RegisterInput},
    auth::cookie,
};
use serde::Deserialize;
use std::net::SocketAddr;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub registered: Option<String>,
    pub activation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: String,

    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

pub(crate) fn login_view(state: &AppState, error: Option<String>, notice: Option<String>, email: String) -> LoginPage {
    LoginPage {
        nav: state.nav(None),
        error,
        notice,
        email,
        google_enabled: state.oauth.google.is_some(),
        piwo_enabled: state.oauth.piwo.is_some(),
    }
}

fn is_true(flag: &Option<String>) -> bool {
    flag.as_deref() == Some("true")
}

pub async fn login_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<LoginQuery>,
) -> PageResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let notice = if is_true(&query.registered) {
        Some("Registration successful. Check your email to activate your account.".to_string())
    } else if is_true(&query.activation) {
        Some("Your account has been activated. You can now log in.".to_string())
    } else {
        None
    };

    Ok(render(login_view(&state, None, notice, String::new()))?.into_response())
}

/// Signs in and starts a 24 hour session
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> PageResult<Response> {
    match accounts::login(&state.db, &form.email, &form.password, Utc::now()).await {
        Ok(user) => {
            let cookie = state.session_cookie(user.id)?;
            Ok(redirect_with_cookie("/", cookie))
        }
        Err(e) if e.is_client_error() => rejected(login_view(&state, Some(e.to_string()), None, form.email)),
        Err(e) => Err(e.into()),
    }
}

pub async fn register_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> PageResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(render(RegisterPage {
        nav: state.nav(None),
        ..Default::default()
    })?
    .into_response())
}

/// Creates an inactive account and mails the activation link
///
/// A failed email does not undo the registration: the page explains that
/// the account exists and links to the resend form.
pub async fn register(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> PageResult<Response> {
    let rerender = |error: String, form: RegisterForm| {
        rejected(RegisterPage {
            nav: state.nav(None),
            error: Some(error),
            name: form.name,
            email: form.email,
        })
    };

    if let Err(e) = form.validate() {
        return rerender(validation_message(&e), form);
    }

    let input = RegisterInput {
        name: form.name.clone(),
        email: form.email.clone(),
        password: form.password.clone(),
        password_confirm: form.password_confirm.clone(),
        ip: accounts::client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
    };

    let (user, token) = match accounts::register(&state.db, input).await {
        Ok(created) => created,
        Err(e) if e.is_client_error() => return rerender(e.to_string(), form),
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = state.mailer.send_activation_email(&user.email, &user.name, &token).await {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send activation email");
        let page = MessagePage::new(
            state.nav(None),
            "Account created",
            "Your account was created, but the activation email could not be sent. \
             You can request a new activation link.",
        )
        .error()
        .with_link("/auth/resend-activation", "Resend activation email");
        return Ok(render(page)?.into_response());
    }

    Ok(Redirect::to("/auth/login?registered=true").into_response())
}

pub async fn logout() -> Response {
    redirect_with_cookie("/", cookie::expired_cookie(cookie::SESSION_COOKIE))
}

pub async fn activate(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> PageResult<Response> {
    let token = query.token.unwrap_or_default();

    match accounts::activate(&state.db, &token).await {
        Ok(_) => Ok(Redirect::to("/auth/login?activation=true").into_response()),
        Err(AccountError::AlreadyActivated) => {
            let page = MessagePage::new(state.nav(None), "Account activation", &AccountError::AlreadyActivated.to_string())
                .with_link("/auth/login", "Log in");
            Ok(render(page)?.into_response())
        }
        Err(e) if e.is_client_error() => {
            let page = MessagePage::new(state.nav(None), "Account activation", &e.to_string())
                .error()
                .with_link("/auth/resend-activation", "Resend activation email");
            rejected(page)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn resend_activation_page(State(state): State<AppState>) -> PageResult<Response> {
    Ok(render(ResendActivationPage {
        nav: state.nav(None),
        ..Default::default()
    })?
    .into_response())
}

pub async fn resend_activation(State(state): State<AppState>, Form(form): Form<EmailForm>) -> PageResult<Response> {
    let mut page = ResendActivationPage {
        nav: state.nav(None),
        email: form.email.clone(),
        ..Default::default()
    };

    match accounts::resend_activation(&state.db, &form.email).await {
        Ok((user, token)) => match state.mailer.send_activation_email(&user.email, &user.name, &token).await {
            Ok(()) => page.notice = Some("A new activation link has been sent to your email.".to_string()),
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to resend activation email");
                page.error = Some("The activation email could not be sent. Please try again later.".to_string());
            }
        },
        Err(e) if e.is_client_error() => page.error = Some(e.to_string()),
        Err(e) => return Err(e.into()),
    }

    let failed = page.error.is_some();
    render_outcome(page, failed)
}

pub async fn forgot_password_page(State(state): State<AppState>) -> PageResult<Response> {
    Ok(render(ForgotPasswordPage {
        nav: state.nav(None),
        ..Default::default()
    })?
    .into_response())
}

/// Mails a reset link; the answer is the same whether the email is known
pub async fn forgot_password(State(state): State<AppState>, Form(form): Form<EmailForm>) -> PageResult<Response> {
    let mut page = ForgotPasswordPage {
        nav: state.nav(None),
        ..Default::default()
    };

    match accounts::request_password_reset(&state.db, &form.email).await {
        Ok(Some((user, token))) => {
            if let Err(e) = state.mailer.send_password_reset_email(&user.email, &user.name, &token).await {
                tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
            }
            page.notice = Some(RESET_REQUESTED.to_string());
        }
        Ok(None) => page.notice = Some(RESET_REQUESTED.to_string()),
        Err(e) if e.is_client_error() => page.error = Some(e.to_string()),
        Err(e) => return Err(e.into()),
    }

    let failed = page.error.is_some();
    render_outcome(page, failed)
}

const RESET_REQUESTED: &str = "If an account with that email exists, a password reset link has been sent.";

fn reset_link_failed(state: &AppState, err: &AccountError) -> MessagePage {
    MessagePage::new(state.nav(None), "Password reset", &err.to_string())
        .error()
        .with_link("/auth/forgot-password", "Request a new link")
}

pub async fn reset_password_page(State(state): State<AppState>, Query(query): Query<TokenQuery>) -> PageResult<Response> {
    let token = query.token.unwrap_or_default();

    match accounts::find_reset_user(&state.db, &token).await {
        Ok(_) => Ok(render(ResetPasswordPage {
            nav: state.nav(None),
            error: None,
            token,
        })?
        .into_response()),
        Err(e) if e.is_client_error() => rejected(reset_link_failed(&state, &e)),
        Err(e) => Err(e.into()),
    }
}

pub async fn reset_password(State(state): State<AppState>, Form(form): Form<ResetPasswordForm>) -> PageResult<Response> {
    match accounts::reset_password(&state.db, &form.token, &form.password, &form.password_confirm).await {
        Ok(_) => {
            let page = MessagePage::new(
                state.nav(None),
                "Password changed",
                "Your password has been changed. You can now log in.",
            )
            .with_link("/auth/login", "Log in");
            Ok(render(page)?.into_response())
        }
        Err(e @ (AccountError::InvalidResetToken | AccountError::ResetTokenExpired)) => {
            rejected(reset_link_failed(&state, &e))
        }
        Err(e) if e.is_client_error() => rejected(ResetPasswordPage {
            nav: state.nav(None),
            error: Some(e.to_string()),
            token: form.token,
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_form_validation() {
        let form = RegisterForm {
            name: "Brewer".to_string(),
            email: "not-an-email".to_string(),
            password: "longenough".to_string(),
            password_confirm: "longenough".to_string(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(validation_message(&errors), "Invalid email format");

        let form = RegisterForm {
            email: "brewer@example.com".to_string(),
            ..form
        };
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_is_true() {
        assert!(is_true(&Some("true".to_string())));
        assert!(!is_true(&Some("1".to_string())));
        assert!(!is_true(&None));
    }
}
