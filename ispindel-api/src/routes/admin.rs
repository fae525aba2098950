/// Admin panel
///
/// Only the account whose email matches `ADMIN_EMAIL` gets in; see
/// [`AdminUser`].
///
/// # Endpoints
///
/// - `GET /admin` - Totals
/// - `GET /admin/users`, `GET /admin/users/:id`
/// - `POST /admin/users/:id/delete` - Delete an account and its data
/// - `GET /admin/ispindels`, `POST /admin/ispindels/:id/delete`
/// - `GET /admin/fermentations`

use crate::{
    app::AppState,
    error::{PageError, PageResult},
    middleware::auth::AdminUser,
    routes::render,
    views::{AdminFermentationsPage, AdminIndexPage, AdminIspindelsPage, AdminUserDetailPage, AdminUsersPage},
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use ispindel_shared::{
    accounts,
    devices::{self, DeletedBy},
    models::{Fermentation, Ispindel, User},
};
use uuid::Uuid;

async fn find_user(state: &AppState, id: Uuid) -> PageResult<User> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| PageError::NotFound("User not found".to_string()))
}

pub async fn index(State(state): State<AppState>, AdminUser(admin): AdminUser) -> PageResult<Response> {
    Ok(render(AdminIndexPage {
        nav: state.nav(Some(&admin)),
        users: User::count(&state.db).await?,
        active_users: User::count_active(&state.db).await?,
        ispindels: Ispindel::count(&state.db).await?,
        fermentations: Fermentation::count(&state.db).await?,
    })?
    .into_response())
}

pub async fn users(State(state): State<AppState>, AdminUser(admin): AdminUser) -> PageResult<Response> {
    Ok(render(AdminUsersPage {
        nav: state.nav(Some(&admin)),
        users: User::list_all(&state.db).await?,
        admin_email: state.config.admin_email.to_lowercase(),
    })?
    .into_response())
}

pub async fn user_detail(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    let user = find_user(&state, id).await?;

    Ok(render(AdminUserDetailPage {
        nav: state.nav(Some(&admin)),
        is_admin_account: state.config.is_admin(&user.email),
        ispindels: Ispindel::list_by_user(&state.db, user.id).await?,
        fermentations: Fermentation::list_by_user(&state.db, user.id).await?,
        user,
    })?
    .into_response())
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    let user = find_user(&state, id).await?;

    if state.config.is_admin(&user.email) {
        return Err(PageError::Forbidden("The administrator account cannot be deleted".to_string()));
    }

    accounts::delete_account(&state.db, &user, None).await?;
    tracing::info!(admin_id = %admin.id, user_id = %user.id, "Admin deleted user");

    Ok(Redirect::to("/admin/users").into_response())
}

pub async fn ispindels(State(state): State<AppState>, AdminUser(admin): AdminUser) -> PageResult<Response> {
    Ok(render(AdminIspindelsPage {
        nav: state.nav(Some(&admin)),
        ispindels: Ispindel::list_all_with_owner(&state.db).await?,
    })?
    .into_response())
}

pub async fn delete_ispindel(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> PageResult<Response> {
    let ended = devices::delete_device(&state.db, id, DeletedBy::Admin).await?;
    tracing::info!(admin_id = %admin.id, ispindel_id = %id, fermentations_ended = ended, "Admin deleted iSpindel");

    Ok(Redirect::to("/admin/ispindels").into_response())
}

pub async fn fermentations(State(state): State<AppState>, AdminUser(admin): AdminUser) -> PageResult<Response> {
    Ok(render(AdminFermentationsPage {
        nav: state.nav(Some(&admin)),
        fermentations: Fermentation::list_all_with_owner(&state.db).await?,
    })?
    .into_response())
}
