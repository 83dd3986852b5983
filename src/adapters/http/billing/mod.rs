//! HTTP adapter for webhook ingestion.
//!
//! - `POST /webhook` - Signed provider webhooks
//! - `GET /health` - Liveness check

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingAppState, WebhookApiError, SIGNATURE_HEADER};
pub use routes::billing_router;
