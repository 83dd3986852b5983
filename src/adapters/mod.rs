//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum webhook endpoint
//! - `memory` - In-process stores for tests and single-instance use
//! - `postgres` - sqlx-backed stores
//! - `stripe` - Stripe payment provider and webhook verification

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;

pub use memory::{InMemoryBillingRepository, InMemoryProcessedEventStore};
pub use postgres::{PostgresBillingRepository, PostgresProcessedEventStore};
pub use stripe::{MockPaymentProvider, StripeConfig, StripePaymentAdapter};
