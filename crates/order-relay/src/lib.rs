//! Order relay - storefront order submissions delivered by email.
//!
//! The shop's web page POSTs a JSON order payload; this crate relays it
//! over SMTP as a full summary to the fixed shop inbox and, for checkout
//! submissions, an abbreviated confirmation copy to the buyer. A base64
//! payment-slip image embedded in the payload is attached to the shop
//! copy when it decodes cleanly.
//!
//! The core lives in [`dispatch::OrderDispatcher`]; `main.rs` wires it to
//! a Lambda HTTP handler. There is no queue, no retry, and no state
//! between invocations beyond the configuration loaded at startup.

pub mod dispatch;
pub mod mailer;
pub mod template;
pub mod types;

pub use dispatch::{DispatchError, OrderDispatcher};
pub use mailer::{MailTransport, OutgoingEmail, SmtpMailer, TransportError};
pub use types::{Attachment, DispatchOutcome, OrderPayload, SubmissionMode};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SMTP connection settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,

    /// Implicit TLS (SMTPS) when true, STARTTLS otherwise.
    pub implicit_tls: bool,

    pub user: String,
    pub pass: String,

    pub connect_timeout: Duration,
    pub send_timeout: Duration,
}

/// Process-wide relay configuration, loaded once at startup and passed
/// into the dispatcher. Nothing below this boundary reads the
/// environment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub smtp: SmtpConfig,

    /// Fixed inbox that receives every order notification.
    pub shop_email: String,

    /// Display identity for the From header, e.g. `DVD Shop <orders@example.com>`.
    pub mail_from: String,
}

/// Startup configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SMTP credentials missing: set SMTP_USER and SMTP_PASS")]
    MissingCredentials,
}

impl RelayConfig {
    /// Load from canonical environment keys. Alias names from older
    /// handler revisions (`GMAIL_USER`, `TO_EMAIL`, `SMTP_SECURE`) are
    /// intentionally not consulted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let user = std::env::var("SMTP_USER").ok().filter(|v| !v.is_empty());
        let pass = std::env::var("SMTP_PASS").ok().filter(|v| !v.is_empty());
        let (user, pass) = match (user, pass) {
            (Some(user), Some(pass)) => (user, pass),
            _ => return Err(ConfigError::MissingCredentials),
        };

        let port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(465);
        let implicit_tls = std::env::var("SMTP_IMPLICIT_TLS")
            .map(|v| parse_bool(&v))
            .unwrap_or(port == 465);

        Ok(Self {
            smtp: SmtpConfig {
                host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                port,
                implicit_tls,
                connect_timeout: duration_from_env("SMTP_CONNECT_TIMEOUT_SECS", 10),
                send_timeout: duration_from_env("SMTP_SEND_TIMEOUT_SECS", 30),
                user: user.clone(),
                pass,
            },
            shop_email: std::env::var("SHOP_EMAIL").unwrap_or_else(|_| user.clone()),
            mail_from: std::env::var("MAIL_FROM").unwrap_or_else(|_| format!("DVD Shop <{user}>")),
        })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn duration_from_env(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_secs),
    )
}
