//! Billing handlers - Webhook ingestion and subscription reconciliation.
//!
//! - `process_webhook` - Idempotent entry point for signed deliveries
//! - `event_router` - Handler table keyed by event type
//! - `customer_linker`, `subscription_resolver`, `plan_resolver` - Identity
//!   and plan reconciliation
//! - `period_status_upserter` - Canonical writer for period and status fields
//! - `prune_processed_events` - Retention for idempotency markers

mod customer_linker;
mod event_router;
mod period_status_upserter;
mod plan_resolver;
mod process_webhook;
mod prune_processed_events;
mod subscription_resolver;

pub use customer_linker::CustomerLinker;
pub use event_router::{BillingEventHandler, EventRouter, RouteOutcome};
pub use period_status_upserter::{PeriodStatusUpserter, Resolution, UpsertOutcome};
pub use plan_resolver::PlanResolver;
pub use process_webhook::{
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult, DEFAULT_CLAIM_LEASE,
    DEFAULT_HANDLER_TIMEOUT,
};
pub use prune_processed_events::PruneProcessedEventsHandler;
pub use subscription_resolver::{ReconcileOutcome, SubscriptionResolver};
