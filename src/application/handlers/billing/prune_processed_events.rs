//! PruneProcessedEventsHandler - Retention for idempotency markers.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::ProcessedEventStore;

/// Deletes processed markers older than the retention window.
///
/// Redeliveries older than the window are no longer recognised as
/// duplicates; providers stop retrying well before then.
pub struct PruneProcessedEventsHandler {
    store: Arc<dyn ProcessedEventStore>,
    retention: Duration,
}

impl PruneProcessedEventsHandler {
    pub fn new(store: Arc<dyn ProcessedEventStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Runs one pruning pass and returns the number of markers deleted.
    pub async fn handle(&self) -> Result<u64, DomainError> {
        let cutoff = Timestamp::now().minus(self.retention);
        let deleted = self.store.delete_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, cutoff = %cutoff.as_datetime(), "Pruned processed webhook events");
        }
        Ok(deleted)
    }
}
