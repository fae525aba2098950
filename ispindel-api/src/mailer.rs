/// Outgoing email: account activation, password reset and contact messages.

use crate::config::{MailConfig, MailTransportConfig};
use askama::Template;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("no mail transport is configured")]
    NotConfigured,

    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to send message: {0}")]
    Send(String),

    #[error("failed to render message: {0}")]
    Render(#[from] askama::Error),

    #[error("failed to prepare mail directory: {0}")]
    Io(#[from] std::io::Error),
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Disabled,
}

#[derive(Template)]
#[template(path = "email/activation.html")]
struct ActivationEmail<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmail<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/contact.html")]
struct ContactEmail<'a> {
    from_name: &'a str,
    from_email: &'a str,
    subject: &'a str,
    body: &'a str,
    devices: &'a [String],
    fermentations: &'a [String],
}

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    app_url: String,
}

impl EmailService {
    pub fn new(config: &MailConfig, app_url: &str) -> Result<Self, MailError> {
        let transport = match &config.transport {
            MailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
            } => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| MailError::Send(format!("create SMTP transport: {e}")))?
                    .port(*port);

                if let (Some(username), Some(password)) = (username, password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }

                EmailTransport::Smtp(builder.build())
            }
            MailTransportConfig::File { dir } => {
                let dir = Path::new(dir);
                if !dir.exists() {
                    std::fs::create_dir_all(dir)?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
            MailTransportConfig::Disabled => {
                warn!("No SMTP_HOST or MAIL_FILE_DIR configured, outgoing email is disabled");
                EmailTransport::Disabled
            }
        };

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            app_url: app_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn send_activation_email(&self, to_email: &str, to_name: &str, token: &str) -> Result<(), MailError> {
        let link = format!("{}/auth/activate?token={}", self.app_url, token);
        let body = ActivationEmail { name: to_name, link: &link }.render()?;

        self.send_email(to_email, Some(to_name), "Activate your iSpindel account", body)
            .await
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        to_name: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let link = format!("{}/auth/reset-password?token={}", self.app_url, token);
        let body = PasswordResetEmail { name: to_name, link: &link }.render()?;

        self.send_email(to_email, Some(to_name), "Reset your iSpindel password", body)
            .await
    }

    /// Forwards a message from the dashboard contact form to the admin
    #[allow(clippy::too_many_arguments)]
    pub async fn send_contact_message(
        &self,
        admin_email: &str,
        from_name: &str,
        from_email: &str,
        subject: &str,
        body: &str,
        devices: &[String],
        fermentations: &[String],
    ) -> Result<(), MailError> {
        let html = ContactEmail {
            from_name,
            from_email,
            subject,
            body,
            devices,
            fermentations,
        }
        .render()?;

        self.send_email(admin_email, None, &format!("[iSpindel contact] {}", subject), html)
            .await
    }

    async fn send_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        subject: &str,
        body: String,
    ) -> Result<(), MailError> {
        let from = mailbox(Some(&self.from_name), &self.from_email)?;
        let to = mailbox(to_name, to_email)?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| MailError::Send(format!("SMTP: {e}")))?;
            }
            EmailTransport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| MailError::Send(format!("file: {e}")))?;
            }
            EmailTransport::Disabled => return Err(MailError::NotConfigured),
        }

        info!(subject, "Sent email");
        Ok(())
    }
}

fn mailbox(name: Option<&str>, email: &str) -> Result<Mailbox, MailError> {
    let address = email.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: email.to_string(),
        reason: e.to_string(),
    })?;

    let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, address))
}
