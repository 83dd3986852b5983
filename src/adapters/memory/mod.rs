//! In-memory adapters for tests and single-instance deployments.

mod billing_repository;
mod processed_event_store;

pub use billing_repository::InMemoryBillingRepository;
pub use processed_event_store::InMemoryProcessedEventStore;
