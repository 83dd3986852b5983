//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `BillingRepository` - Customers, subscriptions, status history, plans
//! - `ProcessedEventStore` - Idempotency markers for provider events
//! - `PaymentProvider` - Webhook verification and subscription lookup

mod billing_repository;
mod payment_provider;
mod processed_event_store;

pub use billing_repository::BillingRepository;
pub use payment_provider::{PaymentError, PaymentErrorCode, PaymentProvider};
pub use processed_event_store::{ClaimOutcome, ProcessedEventStore};
