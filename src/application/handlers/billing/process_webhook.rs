//! ProcessWebhookHandler - Idempotent ingestion of signed provider webhooks.
//!
//! Verify → duplicate check → claim → route (bounded) → mark processed.
//! An event is marked processed only after every effect succeeded; any
//! failure releases the claim so the provider's redelivery can retry.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::WebhookError;
use crate::ports::{ClaimOutcome, PaymentProvider, ProcessedEventStore};

use super::event_router::{EventRouter, RouteOutcome};

/// Default bound on one routed handler.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lease on a processing claim.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(60);

/// Command to process one webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw request body, byte-for-byte as received.
    pub payload: Vec<u8>,
    /// Signature header value, if the request carried one.
    pub signature: Option<String>,
}

/// Result of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessWebhookResult {
    /// Effects applied (or the event was acknowledged without any).
    Processed(RouteOutcome),
    /// The event id was already processed; nothing was touched.
    Duplicate,
}

/// Handler for incoming webhook deliveries.
pub struct ProcessWebhookHandler {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn ProcessedEventStore>,
    router: Arc<EventRouter>,
    handler_timeout: Duration,
    claim_lease: Duration,
}

impl ProcessWebhookHandler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn ProcessedEventStore>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            provider,
            store,
            router,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookResult, WebhookError> {
        // 1. Authenticate before any store access
        let signature = cmd.signature.ok_or(WebhookError::MissingSignature)?;
        let event = self
            .provider
            .verify_webhook(&cmd.payload, &signature)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "Webhook verification failed");
                err
            })?;

        // 2. Cheap duplicate check
        if self.store.was_processed(&event.id).await? {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Duplicate webhook event"
            );
            return Ok(ProcessWebhookResult::Duplicate);
        }

        // 3. Atomic claim
        match self
            .store
            .try_claim(&event.id, &event.event_type, self.claim_lease)
            .await?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => return Ok(ProcessWebhookResult::Duplicate),
            ClaimOutcome::InFlight => {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Webhook event claimed by another delivery"
                );
                return Err(WebhookError::InFlight);
            }
        }

        // 4. Route under a time bound
        let routed = match tokio::time::timeout(self.handler_timeout, self.router.route(&event)).await
        {
            Ok(result) => result,
            Err(_) => Err(WebhookError::Timeout),
        };

        // 5. Mark or release
        match routed {
            Ok(outcome) => {
                if let Err(err) = self.store.mark_processed(&event.id).await {
                    self.release(&event.id).await;
                    return Err(err.into());
                }
                Ok(ProcessWebhookResult::Processed(outcome))
            }
            Err(err) => {
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Webhook processing failed"
                );
                self.release(&event.id).await;
                Err(err)
            }
        }
    }

    /// Best-effort claim release; a leftover claim expires with its lease.
    async fn release(&self, event_id: &str) {
        if let Err(err) = self.store.release(event_id).await {
            tracing::warn!(event_id, error = %err, "Failed to release webhook claim");
        }
    }
}
