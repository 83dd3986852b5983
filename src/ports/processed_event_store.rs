//! ProcessedEventStore port - Idempotency markers for provider events.
//!
//! Providers deliver webhooks at least once, and sometimes concurrently.
//! The store records which event ids have had their effects applied so a
//! redelivery is acknowledged without touching billing state again.
//!
//! A marker moves through two states:
//!
//! - `processing` - claimed by one delivery; expires after the lease
//! - `processed` - effects applied; redeliveries are duplicates
//!
//! The claim must be atomic (a unique insert on `event_id`), so two
//! instances racing on the same event cannot both win.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::{DomainError, Timestamp};

/// Result of an attempt to claim an event for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery owns the event and must process it.
    Claimed,
    /// The event was already processed; acknowledge as a duplicate.
    AlreadyProcessed,
    /// Another delivery holds a live claim.
    InFlight,
}

/// Port for idempotency tracking of provider events.
///
/// # Example
///
/// ```ignore
/// if store.was_processed(&event.id).await? {
///     return Ok(Duplicate);
/// }
/// match store.try_claim(&event.id, &event.event_type, lease).await? {
///     ClaimOutcome::Claimed => { /* route, then mark_processed or release */ }
///     ClaimOutcome::AlreadyProcessed => return Ok(Duplicate),
///     ClaimOutcome::InFlight => return Err(WebhookError::InFlight),
/// }
/// ```
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns `true` if the event's effects have already been applied.
    ///
    /// A live claim does not count as processed.
    async fn was_processed(&self, event_id: &str) -> Result<bool, DomainError>;

    /// Atomically claims the event for processing.
    ///
    /// Claims older than `lease` are treated as abandoned and re-claimed.
    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError>;

    /// Marks a claimed event as processed.
    ///
    /// Called only AFTER all effects have been applied.
    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError>;

    /// Drops a claim so a redelivery can retry. No-op for processed events.
    async fn release(&self, event_id: &str) -> Result<(), DomainError>;

    /// Deletes processed markers older than the given timestamp.
    ///
    /// Returns the number of markers deleted.
    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError>;
}
