/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use ispindel_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::from_config(pool, config)?;
/// let app = ispindel_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    mailer::EmailService,
    middleware::{auth::session_layer, security::SecurityHeadersLayer},
    oauth::OAuthProviders,
    views::Nav,
};
use axum::{
    routing::{get, post},
    Router,
};
use ispindel_shared::{
    auth::{cookie, jwt},
    models::User,
    styles::StyleCatalog,
    telemetry::TelemetrySettings,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Outgoing email
    pub mailer: Arc<EmailService>,

    /// Enabled OAuth providers
    pub oauth: Arc<OAuthProviders>,

    /// BJCP style catalog for the fermentation form
    pub styles: Arc<StyleCatalog>,

    /// Client for OAuth token and profile requests
    pub http: reqwest::Client,

    /// Ingestion tunables
    pub telemetry: TelemetrySettings,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: Config,
        mailer: EmailService,
        oauth: OAuthProviders,
        styles: StyleCatalog,
    ) -> anyhow::Result<Self> {
        // Token endpoints must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            db,
            telemetry: config.telemetry.settings(),
            config: Arc::new(config),
            mailer: Arc::new(mailer),
            oauth: Arc::new(oauth),
            styles: Arc::new(styles),
            http,
        })
    }

    /// Builds every service the configuration describes
    ///
    /// A missing or broken style catalog is not fatal: the form then only
    /// offers the custom style.
    pub fn from_config(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let styles = match StyleCatalog::load(&config.beer_styles_path) {
            Ok(styles) => {
                tracing::info!(count = styles.len(), "Loaded beer styles");
                styles
            }
            Err(e) => {
                tracing::warn!(error = %e, "Beer style catalog unavailable, only custom styles are offered");
                StyleCatalog::custom_only()
            }
        };

        let mailer = EmailService::new(&config.mail, &config.api.app_url)?;
        let oauth = OAuthProviders::from_config(&config.oauth)?;

        Self::new(db, config, mailer, oauth, styles)
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Navigation bar for the given visitor
    pub fn nav(&self, user: Option<&User>) -> Nav {
        Nav::new(user, &self.config)
    }

    /// `Set-Cookie` value starting a fresh session for `user_id`
    pub fn session_cookie(&self, user_id: Uuid) -> Result<String, jwt::JwtError> {
        let token = jwt::create_token(&jwt::Claims::new(user_id), self.jwt_secret())?;
        Ok(cookie::session_cookie(
            cookie::SESSION_COOKIE,
            &token,
            cookie::SESSION_MAX_AGE_SECS,
            self.config.api.production,
        ))
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                        # JSON health check
/// ├── /auth/...                      # login, registration, activation,
/// │                                  # password reset, OAuth
/// ├── /dashboard, /contact           # signed in
/// ├── /ispindels/...                 # device management (signed in)
/// ├── /fermentations/...             # fermentations (signed in)
/// ├── /settings/...                  # account settings (signed in)
/// ├── /admin/...                     # admin panel (ADMIN_EMAIL only)
/// ├── /api/ispindel[/:api_key]       # telemetry ingestion (public)
/// ├── /ispindel/:api_key             # legacy ingestion path
/// └── /static/*                      # CSS, JS, style catalog
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Session resolution (cookie → user)
/// 2. Logging (tower-http TraceLayer)
/// 3. Response compression
/// 4. Security headers
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_routes = Router::new()
        .route("/login", get(routes::auth::login_page).post(routes::auth::login))
        .route("/register", get(routes::auth::register_page).post(routes::auth::register))
        .route("/logout", get(routes::auth::logout))
        .route("/activate", get(routes::auth::activate))
        .route(
            "/resend-activation",
            get(routes::auth::resend_activation_page).post(routes::auth::resend_activation),
        )
        .route(
            "/forgot-password",
            get(routes::auth::forgot_password_page).post(routes::auth::forgot_password),
        )
        .route(
            "/reset-password",
            get(routes::auth::reset_password_page).post(routes::auth::reset_password),
        )
        .route("/google/login", get(routes::oauth::google_login))
        .route("/google/callback", get(routes::oauth::google_callback))
        .route("/piwo/login", get(routes::oauth::piwo_login))
        .route("/piwo/callback", get(routes::oauth::piwo_callback));

    let ispindel_routes = Router::new()
        .route("/", get(routes::ispindels::list))
        .route("/new", get(routes::ispindels::new_page).post(routes::ispindels::create))
        .route("/:id", get(routes::ispindels::detail))
        .route("/:id/edit", get(routes::ispindels::edit_page).post(routes::ispindels::update))
        .route("/:id/regenerate-key", post(routes::ispindels::regenerate_key))
        .route("/:id/delete", post(routes::ispindels::delete));

    let fermentation_routes = Router::new()
        .route("/", get(routes::fermentations::list))
        .route("/new", get(routes::fermentations::new_page).post(routes::fermentations::create))
        .route("/:id", get(routes::fermentations::detail))
        .route("/:id/charts", get(routes::fermentations::charts))
        .route("/:id/end", post(routes::fermentations::end))
        .route("/:id/delete", post(routes::fermentations::delete));

    let settings_routes = Router::new()
        .route("/", get(routes::settings::page))
        .route("/change-password", post(routes::settings::change_password))
        .route("/delete-account", post(routes::settings::delete_account));

    let admin_routes = Router::new()
        .route("/", get(routes::admin::index))
        .route("/users", get(routes::admin::users))
        .route("/users/:id", get(routes::admin::user_detail))
        .route("/users/:id/delete", post(routes::admin::delete_user))
        .route("/ispindels", get(routes::admin::ispindels))
        .route("/ispindels/:id/delete", post(routes::admin::delete_ispindel))
        .route("/fermentations", get(routes::admin::fermentations));

    let ingest_routes = Router::new()
        .route("/api/ispindel", post(routes::ingest::receive))
        .route("/api/ispindel/:api_key", post(routes::ingest::receive_with_key))
        .route("/ispindel/:api_key", post(routes::ingest::receive_with_key));

    Router::new()
        .route("/", get(routes::dashboard::index))
        .route("/health", get(routes::health::health_check))
        .route("/dashboard", get(routes::dashboard::dashboard))
        .route("/contact", post(routes::dashboard::contact))
        .nest("/auth", auth_routes)
        .nest("/ispindels", ispindel_routes)
        .nest("/fermentations", fermentation_routes)
        .nest("/settings", settings_routes)
        .nest("/admin", admin_routes)
        .merge(ingest_routes)
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(axum::middleware::from_fn_with_state(state.clone(), session_layer))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
