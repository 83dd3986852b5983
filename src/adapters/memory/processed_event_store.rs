//! In-memory ProcessedEventStore.
//!
//! Atomic within one process only; a multi-instance deployment needs the
//! Postgres store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{ClaimOutcome, ProcessedEventStore};

#[derive(Debug, Clone)]
enum Marker {
    Processing { claimed_at: Timestamp },
    Processed { processed_at: Timestamp },
}

/// In-memory idempotency store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessedEventStore {
    markers: Arc<Mutex<HashMap<String, (String, Marker)>>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers in the `processed` state.
    pub async fn processed_count(&self) -> usize {
        self.markers
            .lock()
            .await
            .values()
            .filter(|(_, m)| matches!(m, Marker::Processed { .. }))
            .count()
    }

    /// Event type recorded with a marker, if any.
    pub async fn event_type_of(&self, event_id: &str) -> Option<String> {
        self.markers
            .lock()
            .await
            .get(event_id)
            .map(|(event_type, _)| event_type.clone())
    }

    /// Back-dates a processed marker; used to exercise retention pruning.
    pub async fn set_processed_at(&self, event_id: &str, processed_at: Timestamp) {
        if let Some((_, marker)) = self.markers.lock().await.get_mut(event_id) {
            *marker = Marker::Processed { processed_at };
        }
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn was_processed(&self, event_id: &str) -> Result<bool, DomainError> {
        Ok(matches!(
            self.markers.lock().await.get(event_id),
            Some((_, Marker::Processed { .. }))
        ))
    }

    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        let now = Timestamp::now();
        let stale_before = now.minus(lease);
        let mut markers = self.markers.lock().await;

        let outcome = match markers.get(event_id) {
            Some((_, Marker::Processed { .. })) => ClaimOutcome::AlreadyProcessed,
            Some((_, Marker::Processing { claimed_at })) if !claimed_at.is_before(&stale_before) => {
                ClaimOutcome::InFlight
            }
            _ => ClaimOutcome::Claimed,
        };

        if outcome == ClaimOutcome::Claimed {
            markers.insert(
                event_id.to_string(),
                (event_type.to_string(), Marker::Processing { claimed_at: now }),
            );
        }
        Ok(outcome)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let mut markers = self.markers.lock().await;
        let processed = Marker::Processed {
            processed_at: Timestamp::now(),
        };
        match markers.get_mut(event_id) {
            Some((_, marker)) => *marker = processed,
            None => {
                markers.insert(event_id.to_string(), (String::new(), processed));
            }
        }
        Ok(())
    }

    async fn release(&self, event_id: &str) -> Result<(), DomainError> {
        let mut markers = self.markers.lock().await;
        if matches!(markers.get(event_id), Some((_, Marker::Processing { .. }))) {
            markers.remove(event_id);
        }
        Ok(())
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        let mut markers = self.markers.lock().await;
        let before = markers.len();
        markers.retain(|_, (_, marker)| match marker {
            Marker::Processed { processed_at } => !processed_at.is_before(&timestamp),
            Marker::Processing { .. } => true,
        });
        Ok((before - markers.len()) as u64)
    }
}
