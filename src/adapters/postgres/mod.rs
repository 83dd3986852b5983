//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresBillingRepository` - Customers, subscriptions, history, plans
//! - `PostgresProcessedEventStore` - Durable, atomically-claimed idempotency markers

mod billing_repository;
mod processed_event_store;

pub use billing_repository::PostgresBillingRepository;
pub use processed_event_store::PostgresProcessedEventStore;
