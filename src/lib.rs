//! Billing Webhooks - Payment provider webhook ingestion.
//!
//! Receives signed subscription lifecycle events, applies each at most once,
//! and keeps local customer and subscription records in step with the
//! provider, with an append-only history of status changes.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
