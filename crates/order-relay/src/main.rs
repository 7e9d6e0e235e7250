//! Lambda entry point for the order relay.
//!
//! Routes:
//! - `POST /send-order` - dispatch an order submission
//! - `GET /health` - liveness probe
//! - `OPTIONS *` - CORS preflight
//!
//! Configuration is loaded once at startup; missing SMTP credentials
//! abort here, before any request is served.

use lambda_http::{http::StatusCode, run, service_fn, Body, Error, Request, Response};
use order_relay::{
    dispatch::{DispatchError, OrderDispatcher},
    mailer::SmtpMailer,
    types::{OrderPayload, SubmissionMode},
    RelayConfig,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // CloudWatch-optimized logging: structured, no ANSI, no local timestamps.
    tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_current_span(false)
        .without_time()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("order_relay=info".parse().unwrap()),
        )
        .init();

    let config = RelayConfig::from_env()?;
    let shop_email = config.shop_email.clone();
    let dispatcher = Arc::new(OrderDispatcher::new(SmtpMailer::new(&config)?, &*shop_email));

    info!(version = order_relay::VERSION, "starting order relay");

    run(service_fn(move |event: Request| {
        let dispatcher = dispatcher.clone();
        let shop_email = shop_email.clone();
        async move { handler(event, dispatcher, shop_email).await }
    }))
    .await
}

#[instrument(skip_all, fields(method = %event.method(), path = %event.uri().path()))]
async fn handler(
    event: Request,
    dispatcher: Arc<OrderDispatcher<SmtpMailer>>,
    shop_email: String,
) -> Result<Response<Body>, Error> {
    let method = event.method().clone();
    let path = event.uri().path().to_string();

    let response = match (method.as_str(), path.as_str()) {
        ("OPTIONS", _) => preflight(),
        ("POST", "/send-order") => handle_send_order(event, &dispatcher, &shop_email).await,
        ("GET", "/health") => Ok(json_response(
            StatusCode::OK,
            json!({ "status": "healthy", "version": order_relay::VERSION }),
        )),
        (_, "/send-order") => Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "error": "Method Not Allowed" }),
        )),
        _ => {
            warn!(method = %method, path = %path, "route not found");
            Ok(json_response(
                StatusCode::NOT_FOUND,
                json!({ "error": "Not found" }),
            ))
        }
    };

    // CORS headers on every response.
    response.map(|mut resp| {
        let headers = resp.headers_mut();
        headers.insert("Access-Control-Allow-Origin", "*".parse().unwrap());
        headers.insert("Access-Control-Allow-Methods", "POST,OPTIONS".parse().unwrap());
        headers.insert("Access-Control-Allow-Headers", "Content-Type".parse().unwrap());
        resp
    })
}

async fn handle_send_order(
    event: Request,
    dispatcher: &OrderDispatcher<SmtpMailer>,
    shop_email: &str,
) -> Result<Response<Body>, Error> {
    let payload: OrderPayload = match serde_json::from_slice(event.body().as_ref()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "rejecting malformed payload");
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                json!({ "error": "Bad JSON body" }),
            ));
        }
    };

    match dispatcher.dispatch(&payload).await {
        Ok(outcome) => {
            // Confirmation submissions report the buyer as the recipient,
            // everything else the shop inbox.
            let to = match payload.submission_mode() {
                SubmissionMode::OrderConfirmation => payload
                    .buyer_email()
                    .unwrap_or_else(|| shop_email.to_string()),
                _ => shop_email.to_string(),
            };
            Ok(json_response(
                StatusCode::OK,
                json!({
                    "ok": true,
                    "id": outcome.message_id,
                    "to": to,
                    "queued_at": chrono::Utc::now().to_rfc3339(),
                    "attachment": outcome.attachment_present,
                    "customer_copy": {
                        "attempted": outcome.customer_send_attempted,
                        "succeeded": outcome.customer_send_succeeded
                    }
                }),
            ))
        }
        Err(DispatchError::MissingBuyerEmail) => Ok(json_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Missing buyer email" }),
        )),
        Err(e @ DispatchError::AdminDeliveryFailed(_)) => {
            error!(error = %e, "order dispatch failed");
            Ok(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string() }),
            ))
        }
    }
}

fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Max-Age", "86400")
        .body(Body::Empty)
        .unwrap())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}
