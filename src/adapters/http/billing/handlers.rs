//! HTTP handlers for webhook ingestion.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::application::handlers::billing::{
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
};
use crate::domain::billing::WebhookError;

use super::dto::{ErrorResponse, HealthResponse, WebhookAckResponse};

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct BillingAppState {
    pub webhook_handler: Arc<ProcessWebhookHandler>,
}

impl BillingAppState {
    pub fn new(webhook_handler: Arc<ProcessWebhookHandler>) -> Self {
        Self { webhook_handler }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhook - Receive a provider webhook.
///
/// The body is taken as raw bytes; the signature covers the exact bytes sent.
pub async fn receive_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAckResponse>, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ProcessWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match state.webhook_handler.handle(cmd).await? {
        ProcessWebhookResult::Processed(_) => Ok(Json(WebhookAckResponse::processed())),
        ProcessWebhookResult::Duplicate => Ok(Json(WebhookAckResponse::duplicate())),
    }
}

/// GET /health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts webhook errors to HTTP responses.
///
/// Terminal errors get a plain-text 400 so the provider stops retrying;
/// everything else is an opaque 500 the provider will redeliver.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        if self.0.is_terminal() {
            (StatusCode::BAD_REQUEST, format!("Webhook Error: {}", self.0)).into_response()
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::processing_failed()),
            )
                .into_response()
        }
    }
}
