//! PostgreSQL implementation of ProcessedEventStore.
//!
//! The primary key on `event_id` is the check-and-set: only one instance's
//! INSERT can win, and the conditional `DO UPDATE` only takes over claims
//! whose lease has expired.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{ClaimOutcome, ProcessedEventStore};

const STATE_PROCESSING: &str = "processing";
const STATE_PROCESSED: &str = "processed";

pub struct PostgresProcessedEventStore {
    pool: PgPool,
}

impl PostgresProcessedEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

#[async_trait]
impl ProcessedEventStore for PostgresProcessedEventStore {
    async fn was_processed(&self, event_id: &str) -> Result<bool, DomainError> {
        let found: Option<(String,)> = sqlx::query_as(
            "SELECT event_id FROM processed_webhook_events WHERE event_id = $1 AND state = $2",
        )
        .bind(event_id)
        .bind(STATE_PROCESSED)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check processed event", e))?;

        Ok(found.is_some())
    }

    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        lease: Duration,
    ) -> Result<ClaimOutcome, DomainError> {
        let now = Timestamp::now();
        let stale_before = now.minus(lease);

        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, state, claimed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO UPDATE
                SET claimed_at = EXCLUDED.claimed_at, event_type = EXCLUDED.event_type
                WHERE processed_webhook_events.state = $3
                  AND processed_webhook_events.claimed_at < $5
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(STATE_PROCESSING)
        .bind(now.as_datetime())
        .bind(stale_before.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to claim event", e))?;

        if claimed.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        let state: Option<(String,)> =
            sqlx::query_as("SELECT state FROM processed_webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to read claim state", e))?;

        // A row released between the two statements is treated as in flight;
        // the provider's redelivery will claim it.
        Ok(match state {
            Some((s,)) if s == STATE_PROCESSED => ClaimOutcome::AlreadyProcessed,
            _ => ClaimOutcome::InFlight,
        })
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let now = Timestamp::now();
        sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, state, claimed_at, processed_at)
            VALUES ($1, '', $2, $3, $3)
            ON CONFLICT (event_id) DO UPDATE
                SET state = EXCLUDED.state, processed_at = EXCLUDED.processed_at
            "#,
        )
        .bind(event_id)
        .bind(STATE_PROCESSED)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark event processed", e))?;

        Ok(())
    }

    async fn release(&self, event_id: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1 AND state = $2")
            .bind(event_id)
            .bind(STATE_PROCESSING)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to release claim", e))?;

        Ok(())
    }

    async fn delete_before(&self, timestamp: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM processed_webhook_events WHERE state = $1 AND processed_at < $2",
        )
        .bind(STATE_PROCESSED)
        .bind(timestamp.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to prune processed events", e))?;

        Ok(result.rows_affected())
    }
}
