//! Order payload model and derived values.
//!
//! The payload arrives from the storefront as untrusted JSON: any field
//! may be missing or wrong-typed. Deserialization never rejects a body
//! for a bad field; bad values degrade to the documented defaults so the
//! shop notification still goes out whenever the body itself is valid
//! JSON.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One storefront order submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub order_id: Option<String>,

    /// `"order"` requests a buyer confirmation copy, `"notify"` is a
    /// shop-only transfer notice, anything else is a plain message.
    #[serde(deserialize_with = "lenient_string")]
    pub mode: Option<String>,

    #[serde(deserialize_with = "lenient")]
    pub buyer: Buyer,

    #[serde(deserialize_with = "lenient")]
    pub cart: Vec<CartLine>,

    // Totals are trusted as submitted, never reconciled against the cart.
    #[serde(deserialize_with = "lenient_amount")]
    pub items_total: f64,
    #[serde(deserialize_with = "lenient_amount")]
    pub shipping: f64,
    #[serde(deserialize_with = "lenient_amount")]
    pub grand_total: f64,

    #[serde(deserialize_with = "lenient_string")]
    pub bank: Option<String>,

    #[serde(deserialize_with = "lenient")]
    pub slip: Option<Slip>,

    // Buyer-address aliases still sent by older storefront pages.
    #[serde(deserialize_with = "lenient_string")]
    pub to_email: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub recipient: Option<String>,
}

/// Contact block supplied by the purchaser.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Buyer {
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub note: Option<String>,
}

/// One cart line. Line totals are always `price * qty`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CartLine {
    #[serde(deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default = "default_qty", deserialize_with = "lenient_qty")]
    pub qty: u32,
    #[serde(deserialize_with = "lenient_amount")]
    pub price: f64,
}

impl Default for CartLine {
    fn default() -> Self {
        Self {
            title: None,
            qty: 1,
            price: 0.0,
        }
    }
}

impl CartLine {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.qty)
    }
}

/// Payment-slip image embedded in the payload: raw base64 or a full
/// `data:<mime>;base64,` URI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Slip {
    #[serde(deserialize_with = "lenient_string")]
    pub base64: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub filename: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub mime: Option<String>,
}

impl Slip {
    /// Decode into an attachment. Returns `None` when the field is empty
    /// or the base64 is malformed; a bad slip never blocks the
    /// notification itself.
    pub fn decode(&self) -> Option<Attachment> {
        let raw = self.base64.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        // A data URI carries its payload after the first comma.
        let (declared_mime, data) = match raw.split_once(',') {
            Some((prefix, rest)) => (data_uri_mime(prefix), rest),
            None => (None, raw),
        };

        let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let content = BASE64.decode(cleaned.as_bytes()).ok()?;

        let content_type = self
            .mime
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or(declared_mime)
            .unwrap_or("image/png")
            .to_string();
        let filename = self
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or("slip.png")
            .to_string();

        Some(Attachment {
            filename,
            content,
            content_type,
        })
    }
}

/// `data:image/jpeg;base64` -> `image/jpeg`
fn data_uri_mime(prefix: &str) -> Option<&str> {
    let rest = prefix.strip_prefix("data:")?;
    let mime = rest.split(';').next().unwrap_or("").trim();
    (!mime.is_empty()).then_some(mime)
}

/// Decoded payment slip; exists only for the duration of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

/// How one dispatch fared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub admin_send_succeeded: bool,
    pub customer_send_attempted: bool,
    pub customer_send_succeeded: bool,
    /// Message-ID of the shop notification.
    pub message_id: String,
    pub attachment_present: bool,
}

/// What the storefront asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Checkout submission: notify the shop, confirm to the buyer.
    OrderConfirmation,
    /// Transfer-notice form: shop only.
    TransferNotice,
    /// Anything else: generic message to the shop.
    Message,
}

impl OrderPayload {
    pub fn submission_mode(&self) -> SubmissionMode {
        match self.mode.as_deref() {
            Some("order") => SubmissionMode::OrderConfirmation,
            Some("notify") => SubmissionMode::TransferNotice,
            _ => SubmissionMode::Message,
        }
    }

    /// Buyer address: first present of the top-level aliases, then the
    /// contact block; trimmed and lower-cased. Empty strings count as
    /// absent.
    pub fn buyer_email(&self) -> Option<String> {
        [&self.to_email, &self.email, &self.recipient, &self.buyer.email]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_lowercase())
            .find(|s| !s.is_empty())
    }

    /// Order id for display, `-` when absent.
    pub fn order_ref(&self) -> &str {
        self.order_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("-")
    }
}

fn default_qty() -> u32 {
    1
}

/// Deserialize or fall back to the default; a wrong-typed field must not
/// reject the whole body.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Finite number or numeric string; anything else is 0.
fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(parsed.filter(|f| f.is_finite()).unwrap_or(0.0))
}

/// The storefront treats a falsy qty as a single unit.
fn lenient_qty<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let qty = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if qty >= 1.0 { qty as u32 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn payload(value: Value) -> OrderPayload {
        serde_json::from_value(value).expect("payload deserialization is infallible")
    }

    #[test]
    fn test_empty_body_defaults() {
        let p = payload(json!({}));
        assert_eq!(p.order_ref(), "-");
        assert_eq!(p.submission_mode(), SubmissionMode::Message);
        assert!(p.cart.is_empty());
        assert_eq!(p.grand_total, 0.0);
        assert_eq!(p.buyer_email(), None);
    }

    #[test]
    fn test_wrong_typed_fields_degrade_to_defaults() {
        let p = payload(json!({
            "orderId": 42,
            "buyer": "not an object",
            "cart": "not an array",
            "itemsTotal": "abc",
            "shipping": null,
            "grandTotal": {"nested": true},
            "slip": 7,
        }));
        assert_eq!(p.order_ref(), "42");
        assert_eq!(p.buyer.name, None);
        assert!(p.cart.is_empty());
        assert_eq!(p.items_total, 0.0);
        assert_eq!(p.shipping, 0.0);
        assert_eq!(p.grand_total, 0.0);
        assert!(p.slip.is_none());
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let p = payload(json!({
            "cart": [{"title": "Movie", "qty": "2", "price": "100"}],
            "grandTotal": "250",
        }));
        assert_eq!(p.cart[0].qty, 2);
        assert_eq!(p.cart[0].price, 100.0);
        assert_eq!(p.cart[0].line_total(), 200.0);
        assert_eq!(p.grand_total, 250.0);
    }

    #[test]
    fn test_falsy_qty_counts_as_one() {
        let p = payload(json!({"cart": [{"title": "A", "qty": 0, "price": 50}]}));
        assert_eq!(p.cart[0].qty, 1);
        assert_eq!(p.cart[0].line_total(), 50.0);

        let p = payload(json!({"cart": [{"title": "B", "price": 30}]}));
        assert_eq!(p.cart[0].qty, 1);
    }

    #[test]
    fn test_buyer_email_precedence_and_normalization() {
        let p = payload(json!({
            "toEmail": "  First@Example.COM ",
            "email": "second@example.com",
            "buyer": {"email": "third@example.com"},
        }));
        assert_eq!(p.buyer_email(), Some("first@example.com".to_string()));

        // empty alias falls through to the next candidate
        let p = payload(json!({
            "toEmail": "   ",
            "recipient": "Picked@example.com",
        }));
        assert_eq!(p.buyer_email(), Some("picked@example.com".to_string()));

        // the contact block is the last resort
        let p = payload(json!({"buyer": {"email": "x@y.com"}}));
        assert_eq!(p.buyer_email(), Some("x@y.com".to_string()));
    }

    #[test]
    fn test_submission_modes() {
        assert_eq!(
            payload(json!({"mode": "order"})).submission_mode(),
            SubmissionMode::OrderConfirmation
        );
        assert_eq!(
            payload(json!({"mode": "notify"})).submission_mode(),
            SubmissionMode::TransferNotice
        );
        assert_eq!(
            payload(json!({"mode": "whatever"})).submission_mode(),
            SubmissionMode::Message
        );
    }

    #[test]
    fn test_slip_decode_raw_base64_defaults() {
        let slip = Slip {
            base64: Some(BASE64.encode(b"fake image bytes")),
            ..Slip::default()
        };
        let att = slip.decode().unwrap();
        assert_eq!(att.content, b"fake image bytes");
        assert_eq!(att.content_type, "image/png");
        assert_eq!(att.filename, "slip.png");
    }

    #[test]
    fn test_slip_decode_data_uri_mime() {
        let slip = Slip {
            base64: Some(format!("data:image/jpeg;base64,{}", BASE64.encode(b"jpeg"))),
            ..Slip::default()
        };
        let att = slip.decode().unwrap();
        assert_eq!(att.content, b"jpeg");
        assert_eq!(att.content_type, "image/jpeg");
    }

    #[test]
    fn test_slip_declared_mime_wins_over_data_uri() {
        let slip = Slip {
            base64: Some(format!("data:image/jpeg;base64,{}", BASE64.encode(b"x"))),
            mime: Some("image/webp".to_string()),
            filename: Some("receipt.webp".to_string()),
            ..Slip::default()
        };
        let att = slip.decode().unwrap();
        assert_eq!(att.content_type, "image/webp");
        assert_eq!(att.filename, "receipt.webp");
    }

    #[test]
    fn test_slip_decode_tolerates_whitespace() {
        let encoded = BASE64.encode(b"payload with line breaks");
        let mut wrapped = String::new();
        for chunk in encoded.as_bytes().chunks(8) {
            wrapped.push_str(std::str::from_utf8(chunk).unwrap());
            wrapped.push('\n');
        }
        let slip = Slip {
            base64: Some(wrapped),
            ..Slip::default()
        };
        assert_eq!(slip.decode().unwrap().content, b"payload with line breaks");
    }

    #[test]
    fn test_slip_decode_failures_return_none() {
        for bad in ["", "   ", "!!!not base64!!!", "data:image/png;base64,@@@@"] {
            let slip = Slip {
                base64: Some(bad.to_string()),
                ..Slip::default()
            };
            assert!(slip.decode().is_none(), "expected None for {bad:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_slip_roundtrips_source_bytes(bytes in proptest::collection::vec(any::<u8>(), 1..512)) {
            let encoded = BASE64.encode(&bytes);

            let raw = Slip { base64: Some(encoded.clone()), ..Slip::default() };
            let att = raw.decode().unwrap();
            prop_assert_eq!(&att.content, &bytes);
            prop_assert_eq!(att.content_type.as_str(), "image/png");

            let uri = Slip {
                base64: Some(format!("data:image/jpeg;base64,{encoded}")),
                ..Slip::default()
            };
            let att = uri.decode().unwrap();
            prop_assert_eq!(&att.content, &bytes);
            prop_assert_eq!(att.content_type.as_str(), "image/jpeg");
        }
    }
}
