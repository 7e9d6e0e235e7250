//! Order-notification dispatch.
//!
//! One dispatch is a single linear pass: decode the slip, resolve the
//! buyer address, send the mandatory shop notification, then, for
//! checkout submissions, a best-effort confirmation copy to the buyer.
//! Only a failed shop send fails the operation.

use email_address::EmailAddress;
use tracing::{info, instrument, warn};

use crate::mailer::{MailTransport, OutgoingEmail, TransportError};
use crate::template;
use crate::types::{DispatchOutcome, OrderPayload, SubmissionMode};

/// Dispatch errors surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Buyer confirmation requested without a resolvable buyer address.
    #[error("missing buyer email")]
    MissingBuyerEmail,

    /// The mandatory shop notification could not be delivered.
    #[error("admin delivery failed: {0}")]
    AdminDeliveryFailed(#[source] TransportError),
}

/// Validates an order payload, derives the slip attachment, and issues
/// up to two sequential sends through the transport.
pub struct OrderDispatcher<T: MailTransport> {
    transport: T,
    shop_email: String,
}

impl<T: MailTransport> OrderDispatcher<T> {
    pub fn new(transport: T, shop_email: impl Into<String>) -> Self {
        Self {
            transport,
            shop_email: shop_email.into(),
        }
    }

    #[instrument(skip(self, payload), fields(order_id = %payload.order_ref()))]
    pub async fn dispatch(&self, payload: &OrderPayload) -> Result<DispatchOutcome, DispatchError> {
        let mode = payload.submission_mode();

        // Decode failures drop the slip, never the order.
        let attachment = payload.slip.as_ref().and_then(|slip| {
            let has_data = slip.base64.as_deref().is_some_and(|b| !b.trim().is_empty());
            let decoded = slip.decode();
            if has_data && decoded.is_none() {
                warn!("payment slip present but undecodable, sending without it");
            }
            decoded
        });
        let attachment_present = attachment.is_some();

        // The buyer address is mandatory only for confirmation submissions.
        let buyer_email = payload.buyer_email().filter(|e| EmailAddress::is_valid(e));
        if mode == SubmissionMode::OrderConfirmation && buyer_email.is_none() {
            return Err(DispatchError::MissingBuyerEmail);
        }

        // Shop notification first; its outcome is the operation's outcome.
        let admin_mail = OutgoingEmail {
            to: self.shop_email.clone(),
            reply_to: buyer_email.clone(),
            subject: template::admin_subject(payload),
            html: template::order_summary_html(payload),
            text: template::order_summary_text(payload),
            attachment,
        };
        let message_id = self
            .transport
            .send(&admin_mail)
            .await
            .map_err(DispatchError::AdminDeliveryFailed)?;

        // Buyer copy, never attempted before the shop send has resolved.
        let mut customer_send_attempted = false;
        let mut customer_send_succeeded = false;
        if mode == SubmissionMode::OrderConfirmation {
            if let Some(buyer) = &buyer_email {
                customer_send_attempted = true;
                let customer_mail = OutgoingEmail {
                    to: buyer.clone(),
                    reply_to: Some(self.shop_email.clone()),
                    subject: template::customer_subject(payload),
                    html: template::confirmation_html(payload),
                    text: template::confirmation_text(payload),
                    attachment: None,
                };
                match self.transport.send(&customer_mail).await {
                    Ok(id) => {
                        customer_send_succeeded = true;
                        info!(customer_message_id = %id, "buyer confirmation sent");
                    }
                    // Recorded in the outcome only; the shop notification
                    // already went out.
                    Err(e) => warn!(error = %e, to = %buyer, "buyer confirmation failed"),
                }
            }
        }

        Ok(DispatchOutcome {
            admin_send_succeeded: true,
            customer_send_attempted,
            customer_send_succeeded,
            message_id,
            attachment_present,
        })
    }
}
