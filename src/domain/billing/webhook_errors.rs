//! Webhook error types.
//!
//! Every failure in the ingestion pipeline ends up here, with an HTTP status
//! mapping that drives the provider's retry behaviour. Only failures to
//! authenticate a delivery are terminal (4xx, never redelivered). Anything
//! that goes wrong after the signature checks out gets a 5xx, so a payload
//! we cannot handle yet is retried rather than dropped.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur during webhook processing.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// The signature header was not sent.
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    /// No signature in the header matched the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signature timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// The signature header could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A test-mode event reached an endpoint that requires live mode.
    #[error("Test-mode event rejected")]
    TestModeRejected,

    /// A verified payload could not be decoded, e.g. a status value this
    /// build does not know yet.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Required field missing from a verified payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A subscription row had to be created but no plan could be resolved.
    #[error("No plan resolvable for subscription {provider_subscription_id} (price: {price_id:?})")]
    UnresolvablePlan {
        provider_subscription_id: String,
        price_id: Option<String>,
    },

    /// The provider does not know the referenced subscription.
    #[error("Subscription {0} not found at provider")]
    SubscriptionNotFound(String),

    /// Provider API call failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Store operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Routed handler exceeded its time budget.
    #[error("Handler timed out")]
    Timeout,

    /// Another delivery of the same event holds a live claim.
    #[error("Event is being processed by another delivery")]
    InFlight,
}

impl WebhookError {
    /// True for failures the provider must not redeliver.
    ///
    /// Only authentication problems are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
                | WebhookError::ParseError(_)
                | WebhookError::TestModeRejected
        )
    }

    /// Returns true if the provider should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        !self.is_terminal()
    }

    /// Maps the error to an HTTP status code.
    ///
    /// - 4xx: client error, no retry
    /// - 5xx: server error, provider retries
    pub fn status_code(&self) -> StatusCode {
        if self.is_terminal() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}
