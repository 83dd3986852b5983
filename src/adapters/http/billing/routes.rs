//! Axum router configuration for the webhook service.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{health, receive_webhook, BillingAppState};

/// Create the service router.
///
/// # Routes
/// - `POST /webhook` - Provider webhooks (no auth, signature verified)
/// - `GET /health` - Liveness check
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health))
}
