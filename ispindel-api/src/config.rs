/// Configuration management for the web server
///
/// Everything is read from environment variables (a `.env` file is loaded
/// first when present).
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:49330)
/// - `APP_URL`: public base URL used in emails and OAuth redirects
/// - `PRODUCTION`: enables HSTS and `Secure` cookies (default: false)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `JWT_SECRET`: session signing key, at least 32 characters (required)
/// - `ADMIN_EMAIL`: the account allowed into the admin panel (required)
/// - `ISPINDEL_MIN_INTERVAL`: seconds between accepted readings (default: 900)
/// - `ISPINDEL_INACTIVITY_TIMEOUT`: hours before a device counts as silent (default: 6)
/// - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`: outgoing mail
/// - `MAIL_FILE_DIR`: write mails as files instead of sending them
/// - `SMTP_FROM`, `SMTP_FROM_NAME`: sender address and name
/// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`: Google sign-in
/// - `PIWO_OAUTH_*`: piwo.org sign-in
/// - `BEER_STYLES_PATH`: BJCP style catalog (default: static/data/beer_styles.json)
/// - `STATIC_DIR`: directory served under `/static` (default: static)
///
/// # Example
///
/// ```no_run
/// use ispindel_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use ispindel_shared::telemetry::{
    TelemetrySettings, DEFAULT_INACTIVITY_TIMEOUT_HOURS, DEFAULT_MIN_INTERVAL_SECS,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// Default profile endpoint of the piwo.org provider
pub const PIWO_DEFAULT_USERINFO_URL: &str = "https://piwo.org/api/core/me";

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Email of the single administrator
    pub admin_email: String,

    /// Telemetry ingestion tunables
    pub telemetry: TelemetryConfig,

    /// Outgoing mail
    pub mail: MailConfig,

    /// OAuth providers
    pub oauth: OAuthConfig,

    /// BJCP style catalog file
    pub beer_styles_path: PathBuf,

    /// Directory served under `/static`
    pub static_dir: PathBuf,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Public base URL without trailing slash
    pub app_url: String,

    /// Production mode: HSTS and `Secure` cookies
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for session token signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub min_interval_secs: i64,
    pub inactivity_timeout_hours: i64,
}

impl TelemetryConfig {
    pub fn settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            min_interval: chrono::Duration::seconds(self.min_interval_secs),
            inactivity_timeout: chrono::Duration::hours(self.inactivity_timeout_hours),
        }
    }
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub transport: MailTransportConfig,
    pub from_email: String,
    pub from_name: String,
}

/// How mails leave the process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MailTransportConfig {
    /// STARTTLS relay
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        #[serde(skip_serializing)]
        password: Option<String>,
    },

    /// One `.eml` file per message in `dir`
    File { dir: PathBuf },

    /// No transport configured; every send fails
    Disabled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub google: Option<GoogleOAuthConfig>,
    pub piwo: Option<PiwoOAuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiwoOAuthConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub userinfo_url: String,
}

/// Non-empty value of a variable
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_var(name: &str) -> anyhow::Result<String> {
    optional_var(name).ok_or_else(|| anyhow::anyhow!("{} environment variable is required", name))
}

/// Parses a variable, falling back to `default` when unset
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let host = optional_var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_var::<u16>("API_PORT", 49330)?;
        let app_url = optional_var("APP_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        let production = parse_var::<bool>("PRODUCTION", false)?;

        let database_url = required_var("DATABASE_URL")?;
        let max_connections = parse_var::<u32>("DATABASE_MAX_CONNECTIONS", 10)?;

        let jwt_secret = required_var("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let admin_email = required_var("ADMIN_EMAIL")?;

        let min_interval_secs = parse_var::<i64>("ISPINDEL_MIN_INTERVAL", DEFAULT_MIN_INTERVAL_SECS)?;
        let inactivity_timeout_hours =
            parse_var::<i64>("ISPINDEL_INACTIVITY_TIMEOUT", DEFAULT_INACTIVITY_TIMEOUT_HOURS)?;
        if min_interval_secs < 0 || inactivity_timeout_hours <= 0 {
            anyhow::bail!("ISPINDEL_MIN_INTERVAL must be >= 0 and ISPINDEL_INACTIVITY_TIMEOUT > 0");
        }

        let transport = match (optional_var("MAIL_FILE_DIR"), optional_var("SMTP_HOST")) {
            (Some(dir), _) => MailTransportConfig::File { dir: dir.into() },
            (None, Some(host)) => MailTransportConfig::Smtp {
                host,
                port: parse_var::<u16>("SMTP_PORT", 587)?,
                username: optional_var("SMTP_USER"),
                password: optional_var("SMTP_PASSWORD"),
            },
            (None, None) => MailTransportConfig::Disabled,
        };

        let google = match (optional_var("GOOGLE_CLIENT_ID"), optional_var("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_url: format!("{}/auth/google/callback", app_url),
            }),
            _ => None,
        };

        let piwo = match (
            optional_var("PIWO_OAUTH_CLIENT_ID"),
            optional_var("PIWO_OAUTH_CLIENT_SECRET"),
            optional_var("PIWO_OAUTH_AUTH_URL"),
            optional_var("PIWO_OAUTH_TOKEN_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(auth_url), Some(token_url)) => {
                Some(PiwoOAuthConfig {
                    client_id,
                    client_secret,
                    auth_url,
                    token_url,
                    redirect_url: optional_var("PIWO_OAUTH_CALLBACK_URL")
                        .unwrap_or_else(|| format!("{}/auth/piwo/callback", app_url)),
                    userinfo_url: optional_var("PIWO_OAUTH_USERINFO_URL")
                        .unwrap_or_else(|| PIWO_DEFAULT_USERINFO_URL.to_string()),
                })
            }
            _ => None,
        };

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                app_url,
                production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig { secret: jwt_secret },
            admin_email,
            telemetry: TelemetryConfig {
                min_interval_secs,
                inactivity_timeout_hours,
            },
            mail: MailConfig {
                transport,
                from_email: optional_var("SMTP_FROM").unwrap_or_else(|| "noreply@localhost".to_string()),
                from_name: optional_var("SMTP_FROM_NAME").unwrap_or_else(|| "iSpindel".to_string()),
            },
            oauth: OAuthConfig { google, piwo },
            beer_styles_path: optional_var("BEER_STYLES_PATH")
                .unwrap_or_else(|| "static/data/beer_styles.json".to_string())
                .into(),
            static_dir: optional_var("STATIC_DIR").unwrap_or_else(|| "static".to_string()).into(),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Whether `email` belongs to the administrator
    pub fn is_admin(&self, email: &str) -> bool {
        email.trim().eq_ignore_ascii_case(self.admin_email.trim())
    }

    /// Absolute link into the application
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api.app_url, path)
    }
}
