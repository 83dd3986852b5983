//! Application handlers.
//!
//! Command handlers that orchestrate domain operations through ports.

pub mod billing;

pub use billing::{
    // Ingestion
    ProcessWebhookCommand,
    ProcessWebhookHandler,
    ProcessWebhookResult,
    PruneProcessedEventsHandler,
    // Routing
    BillingEventHandler,
    EventRouter,
    RouteOutcome,
};
