//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for Stripe:
//! - Webhook signature verification
//! - Event decoding into provider-neutral domain types
//! - Subscription lookup over the REST API
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks
//! - All secrets are handled via `secrecy::SecretString`

mod mock_payment_provider;
mod stripe_adapter;
mod webhook_types;
mod webhook_verifier;

pub use mock_payment_provider::MockPaymentProvider;
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
pub use webhook_types::{decode_event, SignatureHeader};
pub use webhook_verifier::{sign_payload, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};
