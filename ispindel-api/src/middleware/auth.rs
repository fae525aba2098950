/// Browser session middleware and extractors
///
/// [`session_layer`] runs on every request. When the `token` cookie holds
/// a valid session JWT for an active account, the [`User`] is stored in
/// the request extensions. Handlers then pick the extractor matching how
/// they treat anonymous visitors:
///
/// - [`CurrentUser`]: redirect to `/auth/login`
/// - [`MaybeUser`]: anonymous is fine
/// - [`ApiUser`]: `401` JSON (fetch-driven endpoints)
/// - [`AdminUser`]: redirect when anonymous, `403` page for other users

use crate::{
    app::AppState,
    error::{ApiError, PageError},
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use ispindel_shared::{
    auth::{cookie, jwt},
    models::User,
};
use std::convert::Infallible;

pub const LOGIN_PATH: &str = "/auth/login";

/// Resolves the session cookie into a [`User`]
///
/// Invalid, expired or orphaned sessions are ignored; the request simply
/// continues as anonymous.
pub async fn session_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = cookie::read_cookie(req.headers(), cookie::SESSION_COOKIE) {
        match jwt::validate_token(&token, state.jwt_secret()) {
            Ok(claims) => match User::find_by_id(&state.db, claims.sub).await {
                Ok(Some(user)) if user.is_active => {
                    req.extensions_mut().insert(CurrentUser(user));
                }
                Ok(_) => {
                    tracing::debug!(user_id = %claims.sub, "Session for missing or inactive account");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load session user");
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid session cookie");
            }
        }
    }

    next.run(req).await
}

/// Signed-in user, or a redirect to the login page
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| Redirect::to(LOGIN_PATH))
    }
}

/// Signed-in user if there is one
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<CurrentUser>().map(|u| u.0.clone())))
    }
}

/// Signed-in user for JSON endpoints
#[derive(Debug, Clone)]
pub struct ApiUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for ApiUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .map(|u| ApiUser(u.0.clone()))
            .ok_or_else(|| ApiError::Unauthorized("Login required".to_string()))
    }
}

/// The account named by `ADMIN_EMAIL`
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>().cloned() else {
            return Err(Redirect::to(LOGIN_PATH).into_response());
        };

        if !state.config.is_admin(&user.email) {
            tracing::warn!(user_id = %user.id, "Non-admin user tried to open the admin panel");
            return Err(PageError::Forbidden("Access denied".to_string()).into_response());
        }

        Ok(AdminUser(user))
    }
}
