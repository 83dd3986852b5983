//! Payment provider port.
//!
//! Defines the two provider capabilities reconciliation needs: turning a
//! signed request into a trusted event, and fetching the current state of
//! a subscription. The provider's wire format stays behind this port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{RemoteSubscription, WebhookError, WebhookEvent};

/// Port for payment provider integrations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Verifies the webhook signature and decodes the event.
    ///
    /// Nothing in the payload is trusted until this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Terminal [`WebhookError`] variants for signature, timestamp and
    /// decoding failures.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError>;

    /// Fetches a subscription by provider id.
    ///
    /// Returns `Ok(None)` if the provider does not know the id.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<RemoteSubscription>, PaymentError>;
}

/// Errors from payment provider API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }

    /// The provider answered with a body we could not decode.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidResponse, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        WebhookError::Provider(err.to_string())
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue.
    NetworkError,

    /// API authentication failed.
    AuthenticationError,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Response body did not match the expected shape.
    InvalidResponse,

    /// Provider API error.
    ProviderError,
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidResponse => "invalid_response",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
