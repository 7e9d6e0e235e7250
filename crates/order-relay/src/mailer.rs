//! SMTP delivery.
//!
//! [`MailTransport`] is the seam the dispatcher sends through; the
//! production implementation wraps lettre's async SMTP transport. One
//! message, one send, no retries.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment as AttachmentPart, Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::types::Attachment;
use crate::RelayConfig;

/// One outbound message, transport-agnostic.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// Mail delivery errors. Any failure is terminal for that one send.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid address {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("smtp send failed: {0}")]
    SendFailed(String),
}

/// Delivery seam between the dispatcher and the wire.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver one message, returning its Message-ID.
    async fn send(&self, mail: &OutgoingEmail) -> Result<String, TransportError>;
}

#[async_trait]
impl<T: MailTransport> MailTransport for Arc<T> {
    async fn send(&self, mail: &OutgoingEmail) -> Result<String, TransportError> {
        (**self).send(mail).await
    }
}

/// lettre-backed SMTP sender. Construction only configures the
/// transport; connections are established per send.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &RelayConfig) -> Result<Self, TransportError> {
        let smtp = &config.smtp;

        let builder = if smtp.implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| TransportError::Build(e.to_string()))?;

        // lettre exposes one session timeout; the send bound covers the
        // whole exchange, connect included.
        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
            .timeout(Some(smtp.send_timeout))
            .build();

        let from: Mailbox = config
            .mail_from
            .parse()
            .map_err(|e| TransportError::Address(format!("{}: {e}", config.mail_from)))?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, mail: &OutgoingEmail) -> Result<(Message, String), TransportError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| TransportError::Address(format!("{}: {e}", mail.to)))?;

        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain());

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .message_id(Some(message_id.clone()));

        // Reply-To is advisory; a bad address must not block the send.
        if let Some(reply_to) = &mail.reply_to {
            match reply_to.parse::<Mailbox>() {
                Ok(mailbox) => builder = builder.reply_to(mailbox),
                Err(e) => warn!(reply_to = %reply_to, error = %e, "skipping unparseable reply-to"),
            }
        }

        let alternative = MultiPart::alternative_plain_html(mail.text.clone(), mail.html.clone());

        let message = match &mail.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .unwrap_or_else(|_| {
                        ContentType::parse("application/octet-stream").expect("static mime parses")
                    });
                let part = AttachmentPart::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type);
                builder.multipart(MultiPart::mixed().multipart(alternative).singlepart(part))
            }
            None => builder.multipart(alternative),
        }
        .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    #[instrument(skip(self, mail), fields(to = %mail.to, subject = %mail.subject))]
    async fn send(&self, mail: &OutgoingEmail) -> Result<String, TransportError> {
        let (message, message_id) = self.build_message(mail)?;

        self.transport.send(message).await.map_err(|e| {
            error!(error = %e, "smtp send failed");
            TransportError::SendFailed(e.to_string())
        })?;

        info!(message_id = %message_id, "email sent");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SmtpConfig, RelayConfig};
    use std::time::Duration;

    fn test_config() -> RelayConfig {
        RelayConfig {
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 2525,
                implicit_tls: false,
                user: "shop".to_string(),
                pass: "secret".to_string(),
                connect_timeout: Duration::from_secs(10),
                send_timeout: Duration::from_secs(30),
            },
            shop_email: "shop@example.com".to_string(),
            mail_from: "DVD Shop <shop@example.com>".to_string(),
        }
    }

    fn test_mail() -> OutgoingEmail {
        OutgoingEmail {
            to: "buyer@example.com".to_string(),
            reply_to: Some("shop@example.com".to_string()),
            subject: "Test order".to_string(),
            html: "<p>hello</p>".to_string(),
            text: "hello".to_string(),
            attachment: None,
        }
    }

    #[test]
    fn test_build_message_sets_headers_and_message_id() {
        let mailer = SmtpMailer::new(&test_config()).unwrap();
        let (message, message_id) = mailer.build_message(&test_mail()).unwrap();

        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(message_id.starts_with('<') && message_id.ends_with('>'));
        assert!(formatted.contains(&message_id));
        assert!(formatted.contains("Subject: Test order"));
        assert!(formatted.contains("To: buyer@example.com"));
        assert!(formatted.contains("Reply-To: shop@example.com"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let mailer = SmtpMailer::new(&test_config()).unwrap();
        let mut mail = test_mail();
        mail.attachment = Some(Attachment {
            filename: "slip.png".to_string(),
            content: vec![0x89, 0x50, 0x4e, 0x47],
            content_type: "image/png".to_string(),
        });

        let (message, _) = mailer.build_message(&mail).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("Content-Disposition: attachment"));
        assert!(formatted.contains("slip.png"));
    }

    #[test]
    fn test_bad_reply_to_is_skipped() {
        let mailer = SmtpMailer::new(&test_config()).unwrap();
        let mut mail = test_mail();
        mail.reply_to = Some("not an address".to_string());

        let (message, _) = mailer.build_message(&mail).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(!formatted.contains("Reply-To"));
    }

    #[test]
    fn test_bad_recipient_is_an_error() {
        let mailer = SmtpMailer::new(&test_config()).unwrap();
        let mut mail = test_mail();
        mail.to = "nonsense".to_string();

        assert!(matches!(
            mailer.build_message(&mail),
            Err(TransportError::Address(_))
        ));
    }

    #[test]
    fn test_unknown_attachment_mime_falls_back() {
        let mailer = SmtpMailer::new(&test_config()).unwrap();
        let mut mail = test_mail();
        mail.attachment = Some(Attachment {
            filename: "slip.bin".to_string(),
            content: vec![1, 2, 3],
            content_type: "definitely not a mime type".to_string(),
        });

        let (message, _) = mailer.build_message(&mail).unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(formatted.contains("application/octet-stream"));
    }
}
