//! Billing domain module.
//!
//! Subscription state mirrored from the payment provider, and the events
//! that drive it.
//!
//! # Module Structure
//!
//! - `event_type` - Exhaustive enum of handled provider events
//! - `event` - Verified, decoded webhook event
//! - `remote` - Provider-side subscription, checkout and invoice snapshots
//! - `subscription` - Local subscription record and its canonical fields
//! - `customer` - Local customer record
//! - `status_history` - Append-only status transition log
//! - `plan` - Plan reference data
//! - `webhook_errors` - Pipeline errors with HTTP status mapping

mod customer;
mod event;
mod event_type;
mod plan;
mod remote;
mod status;
mod status_history;
mod subscription;
mod webhook_errors;

pub use customer::Customer;
pub use event::{EventPayload, WebhookEvent};
pub use event_type::BillingEventType;
pub use plan::Plan;
pub use remote::{
    RemoteCheckoutSession, RemoteInvoice, RemoteSubscription, METADATA_PLAN_ID, METADATA_USER_ID,
};
pub use status::SubscriptionStatus;
pub use status_history::StatusHistoryEntry;
pub use subscription::{BillingState, NewSubscription, Subscription, SubscriptionUpdate};
pub use webhook_errors::WebhookError;

#[cfg(test)]
pub(crate) use remote::fixtures;
