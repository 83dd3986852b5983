//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `billing` - Subscriptions, customers, plans and provider events

pub mod billing;
pub mod foundation;
