/// Landing page, dashboard and the contact form

use crate::{
    app::AppState,
    error::PageResult,
    middleware::auth::{CurrentUser, MaybeUser},
    routes::{render, render_status, validation_message},
    views::{DashboardPage, IndexPage},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use ispindel_shared::{
    devices::MAX_DEVICES_PER_USER,
    models::{Fermentation, Ispindel, User},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub contact: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Subject is required (at most 200 characters)"))]
    pub subject: String,

    #[serde(default)]
    #[validate(length(min = 1, max = 5000, message = "Message is required (at most 5000 characters)"))]
    pub message: String,
}

impl ContactForm {
    fn trimmed(self) -> Self {
        Self {
            subject: self.subject.trim().to_string(),
            message: self.message.trim().to_string(),
        }
    }
}

pub async fn index(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> PageResult<Response> {
    if user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    Ok(render(IndexPage { nav: state.nav(None) })?.into_response())
}

async fn dashboard_page(state: &AppState, user: &User) -> Result<DashboardPage, sqlx::Error> {
    Ok(DashboardPage {
        nav: state.nav(Some(user)),
        device_count: Ispindel::count_by_user(&state.db, user.id).await?,
        max_devices: MAX_DEVICES_PER_USER,
        active_fermentations: Fermentation::count_active_by_user(&state.db, user.id).await?,
        contact_error: None,
        contact_notice: None,
        subject: String::new(),
        message: String::new(),
    })
}

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> PageResult<Response> {
    let mut page = dashboard_page(&state, &user).await?;
    if query.contact.as_deref() == Some("sent") {
        page.contact_notice = Some("Thank you, your message has been sent.".to_string());
    }

    Ok(render(page)?.into_response())
}

/// Mails the admin, listing the sender's devices and fermentations
pub async fn contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ContactForm>,
) -> PageResult<Response> {
    let form = form.trimmed();

    let (status, error) = match form.validate() {
        Err(e) => (StatusCode::BAD_REQUEST, validation_message(&e)),
        Ok(()) => {
            let devices: Vec<String> = Ispindel::list_by_user(&state.db, user.id)
                .await?
                .into_iter()
                .map(|d| d.name)
                .collect();
            let fermentations: Vec<String> = Fermentation::list_by_user(&state.db, user.id)
                .await?
                .into_iter()
                .map(|f| f.name)
                .collect();

            match state
                .mailer
                .send_contact_message(
                    &state.config.admin_email,
                    &user.name,
                    &user.email,
                    &form.subject,
                    &form.message,
                    &devices,
                    &fermentations,
                )
                .await
            {
                Ok(()) => {
                    tracing::info!(user_id = %user.id, "Contact message sent");
                    return Ok(Redirect::to("/dashboard?contact=sent").into_response());
                }
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to send contact message");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Your message could not be sent. Please try again later.".to_string(),
                    )
                }
            }
        }
    };

    let mut page = dashboard_page(&state, &user).await?;
    page.contact_error = Some(error);
    page.subject = form.subject;
    page.message = form.message;

    render_status(status, page)
}
