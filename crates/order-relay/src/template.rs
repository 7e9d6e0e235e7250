//! HTML and plain-text bodies for the two outbound messages.
//!
//! Kept as plain `format!` templates: the shop sends exactly two message
//! shapes and no template engine is wanted.

use crate::types::{OrderPayload, SubmissionMode};

pub fn admin_subject(payload: &OrderPayload) -> String {
    let buyer = &payload.buyer;
    match payload.submission_mode() {
        SubmissionMode::OrderConfirmation => format!(
            "New order - {} {} | {}",
            buyer.name.as_deref().unwrap_or(""),
            buyer.phone.as_deref().unwrap_or(""),
            payload.order_ref(),
        ),
        SubmissionMode::TransferNotice => {
            format!("Transfer notice / new order #{}", payload.order_ref())
        }
        SubmissionMode::Message => "Message from the storefront".to_string(),
    }
}

pub fn customer_subject(payload: &OrderPayload) -> String {
    format!("Your order confirmation - {}", payload.order_ref())
}

/// Full order summary for the shop inbox: cart table, totals, contact
/// block, bank reference and note when present.
pub fn order_summary_html(payload: &OrderPayload) -> String {
    let rows: String = payload
        .cart
        .iter()
        .map(|line| {
            format!(
                "<tr><td>{}</td><td align=\"right\">{}</td><td align=\"right\">{}฿</td></tr>",
                escape(line.title.as_deref().unwrap_or("-")),
                line.qty,
                format_amount(line.line_total()),
            )
        })
        .collect();

    let buyer = &payload.buyer;
    let bank_line = payload
        .bank
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(|b| format!("<div>Bank: {}</div>", escape(b)))
        .unwrap_or_default();

    format!(
        r#"<div style="font-family:system-ui,-apple-system,Segoe UI,Roboto,Helvetica,Arial;line-height:1.6">
  <h2>Order summary #{order_id}</h2>
  <table width="100%" cellspacing="0" cellpadding="6" style="border-collapse:collapse;border:1px solid #eee">
    <thead>
      <tr style="background:#fafafa"><th align="left">Item</th><th align="right">Qty</th><th align="right">Price</th></tr>
    </thead>
    <tbody>{rows}</tbody>
    <tfoot>
      <tr><td colspan="2"><b>Items total</b></td><td align="right">{items_total}฿</td></tr>
      <tr><td colspan="2"><b>Shipping</b></td><td align="right">{shipping}฿</td></tr>
      <tr><td colspan="2"><b>Grand total</b></td><td align="right"><b>{grand_total}฿</b></td></tr>
    </tfoot>
  </table>

  <h3 style="margin-top:16px">Buyer</h3>
  <div>Name: {name}</div>
  <div>Phone: {phone}</div>
  <div>Email: {email}</div>
  <div>Address: {address}</div>
  <div>Note: {note}</div>
  {bank_line}
</div>"#,
        order_id = escape(payload.order_ref()),
        rows = rows,
        items_total = format_amount(payload.items_total),
        shipping = format_amount(payload.shipping),
        grand_total = format_amount(payload.grand_total),
        name = escape(buyer.name.as_deref().unwrap_or("-")),
        phone = escape(buyer.phone.as_deref().unwrap_or("-")),
        email = escape(buyer.email.as_deref().unwrap_or("-")),
        address = escape(buyer.address.as_deref().unwrap_or("-")),
        note = escape(buyer.note.as_deref().unwrap_or("-")),
        bank_line = bank_line,
    )
}

pub fn order_summary_text(payload: &OrderPayload) -> String {
    let mut out = format!("Order #{}\n", payload.order_ref());
    for line in &payload.cart {
        out.push_str(&format!(
            "{} x{}: {}฿\n",
            line.title.as_deref().unwrap_or("-"),
            line.qty,
            format_amount(line.line_total()),
        ));
    }
    out.push_str(&format!(
        "Items total: {}฿\nShipping: {}฿\nGrand total: {}฿\n",
        format_amount(payload.items_total),
        format_amount(payload.shipping),
        format_amount(payload.grand_total),
    ));

    let buyer = &payload.buyer;
    out.push_str(&format!(
        "Name: {}\nPhone: {}\nEmail: {}\nAddress: {}\nNote: {}\n",
        buyer.name.as_deref().unwrap_or("-"),
        buyer.phone.as_deref().unwrap_or("-"),
        buyer.email.as_deref().unwrap_or("-"),
        buyer.address.as_deref().unwrap_or("-"),
        buyer.note.as_deref().unwrap_or("-"),
    ));
    if let Some(bank) = payload.bank.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
        out.push_str(&format!("Bank: {bank}\n"));
    }
    out
}

/// Abbreviated confirmation for the buyer: order id, name, totals. Never
/// carries the slip.
pub fn confirmation_html(payload: &OrderPayload) -> String {
    format!(
        r#"<div style="font-family:system-ui,sans-serif">
  <h2>Your order is confirmed</h2>
  <p>Order number: <b>{order_id}</b></p>
  <p>Name: {name}</p>
  <p>Grand total: <b>{grand_total}฿</b> (shipping: {shipping}฿)</p>
  <p>Reply to this email to update your order or check its status.</p>
</div>"#,
        order_id = escape(payload.order_ref()),
        name = escape(payload.buyer.name.as_deref().unwrap_or("-")),
        grand_total = format_amount(payload.grand_total),
        shipping = format_amount(payload.shipping),
    )
}

pub fn confirmation_text(payload: &OrderPayload) -> String {
    format!(
        "Order confirmation\nOrder number: {}\nGrand total: {}฿ (shipping: {}฿)\n",
        payload.order_ref(),
        format_amount(payload.grand_total),
        format_amount(payload.shipping),
    )
}

/// Comma-grouped baht amount; decimals rendered only when present.
pub(crate) fn format_amount(value: f64) -> String {
    let total_cents = (value * 100.0).round() as i64;
    let sign = if total_cents < 0 { "-" } else { "" };
    let whole = (total_cents.abs() / 100) as u64;
    let cents = (total_cents.abs() % 100) as u64;

    let grouped = group_thousands(whole);
    if cents == 0 {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{cents:02}")
    }
}

fn group_thousands(mut n: u64) -> String {
    let mut parts = Vec::new();
    loop {
        if n < 1000 {
            parts.push(n.to_string());
            break;
        }
        parts.push(format!("{:03}", n % 1000));
        n /= 1000;
    }
    parts.reverse();
    parts.join(",")
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
