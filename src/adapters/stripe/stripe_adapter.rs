//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port against the Stripe API.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation for replay prevention
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, webhook_secret);
//! let adapter = StripePaymentAdapter::new(config);
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::billing::{RemoteSubscription, WebhookError, WebhookEvent};
use crate::ports::{PaymentError, PaymentErrorCode, PaymentProvider};

use super::webhook_types::{decode_event, StripeSubscription};
use super::webhook_verifier::{StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Reject events with `livemode: false`.
    require_livemode: bool,

    /// Maximum signature age in seconds.
    signature_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new(api_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
            signature_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    pub fn with_signature_tolerance_secs(mut self, secs: i64) -> Self {
        self.signature_tolerance_secs = secs;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn require_livemode(&self) -> bool {
        self.require_livemode
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    verifier: StripeWebhookVerifier,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Self {
        let verifier = StripeWebhookVerifier::new(config.webhook_secret.clone())
            .with_tolerance_secs(config.signature_tolerance_secs);
        Self {
            config,
            verifier,
            http_client: reqwest::Client::new(),
        }
    }

    /// Uses a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }
}

/// Rejects test-mode events when live mode is required.
pub(crate) fn enforce_livemode(event: &WebhookEvent, require_livemode: bool) -> Result<(), WebhookError> {
    if require_livemode && !event.livemode {
        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Rejected test mode event"
        );
        return Err(WebhookError::TestModeRejected);
    }
    Ok(())
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        self.verifier.verify(payload, signature)?;

        let event = decode_event(payload)?;
        enforce_livemode(&event, self.config.require_livemode)?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Webhook signature verified"
        );

        Ok(event)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<RemoteSubscription>, PaymentError> {
        let url = subscription_url(&self.config.api_base_url, subscription_id)?;

        let response = self
            .http_client
            .get(url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, subscription_id, "Stripe request failed");
                PaymentError::network(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                subscription_id,
                "Stripe API error fetching subscription"
            );
            let code = match status {
                reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                    PaymentErrorCode::AuthenticationError
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
                _ => PaymentErrorCode::ProviderError,
            };
            return Err(PaymentError::new(
                code,
                format!("Stripe API error ({}): {}", status, error_text),
            ));
        }

        let stripe_sub: StripeSubscription = response.json().await.map_err(|e| {
            PaymentError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })?;

        RemoteSubscription::try_from(stripe_sub)
            .map(Some)
            .map_err(|e| PaymentError::invalid_response(e.to_string()))
    }
}

/// Builds `{base}/v1/subscriptions/{id}` with the id percent-encoded as a
/// single path segment.
fn subscription_url(base: &str, subscription_id: &str) -> Result<reqwest::Url, PaymentError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| PaymentError::provider(format!("Invalid Stripe API base URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| PaymentError::provider("Stripe API base URL cannot carry a path"))?
        .pop_if_empty()
        .extend(["v1", "subscriptions", subscription_id]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stripe::webhook_verifier::sign_payload;
    use crate::domain::billing::{BillingEventType, EventPayload};

    const SECRET: &str = "whsec_test_secret";

    fn test_config() -> StripeConfig {
        StripeConfig::new(
            SecretString::new("sk_test_key".to_string()),
            SecretString::new(SECRET.to_string()),
        )
    }

    fn payload(livemode: bool) -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "invoice.payment_succeeded",
            "created": 1_704_067_200,
            "livemode": livemode,
            "data": { "object": { "id": "in_1", "customer": "cus_1", "subscription": "sub_1" } }
        })
        .to_string()
    }

    fn sign_now(body: &str) -> String {
        sign_payload(SECRET, chrono::Utc::now().timestamp(), body.as_bytes())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_new_sets_defaults() {
        let config = test_config();
        assert_eq!(config.api_base_url(), "https://api.stripe.com");
        assert!(!config.require_livemode());
        assert_eq!(config.signature_tolerance_secs, DEFAULT_TOLERANCE_SECS);
    }

    #[test]
    fn config_with_base_url_trims_trailing_slash() {
        let config = test_config().with_base_url("http://localhost:12111/");
        assert_eq!(config.api_base_url(), "http://localhost:12111");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // verify_webhook Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verify_webhook_returns_decoded_event() {
        let adapter = StripePaymentAdapter::new(test_config());
        let body = payload(false);

        let event = adapter
            .verify_webhook(body.as_bytes(), &sign_now(&body))
            .await
            .unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.kind(), Some(BillingEventType::InvoicePaymentSucceeded));
        assert!(matches!(event.payload, EventPayload::Invoice(_)));
    }

    #[tokio::test]
    async fn verify_webhook_rejects_invalid_signature() {
        let adapter = StripePaymentAdapter::new(test_config());
        let body = payload(false);
        let header = sign_payload("whsec_wrong", chrono::Utc::now().timestamp(), body.as_bytes());

        let result = adapter.verify_webhook(body.as_bytes(), &header).await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
    }

    #[tokio::test]
    async fn verify_webhook_rejects_invalid_json_after_valid_signature() {
        let adapter = StripePaymentAdapter::new(test_config());
        let body = "{not json";

        let result = adapter.verify_webhook(body.as_bytes(), &sign_now(body)).await;

        assert!(matches!(result, Err(WebhookError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn verify_webhook_rejects_test_mode_when_live_required() {
        let adapter = StripePaymentAdapter::new(test_config().with_require_livemode(true));
        let body = payload(false);

        let result = adapter.verify_webhook(body.as_bytes(), &sign_now(&body)).await;

        assert!(matches!(result, Err(WebhookError::TestModeRejected)));
    }

    #[tokio::test]
    async fn verify_webhook_accepts_live_event_when_live_required() {
        let adapter = StripePaymentAdapter::new(test_config().with_require_livemode(true));
        let body = payload(true);

        assert!(adapter
            .verify_webhook(body.as_bytes(), &sign_now(&body))
            .await
            .is_ok());
    }

    #[test]
    fn subscription_url_appends_id_as_one_segment() {
        let url = subscription_url("https://api.stripe.com", "sub_123").unwrap();
        assert_eq!(url.as_str(), "https://api.stripe.com/v1/subscriptions/sub_123");

        let url = subscription_url("http://localhost:12111/", "sub_123").unwrap();
        assert_eq!(url.as_str(), "http://localhost:12111/v1/subscriptions/sub_123");
    }

    #[test]
    fn subscription_url_encodes_path_and_query_characters() {
        let url = subscription_url("https://api.stripe.com", "sub_1/../customers?expand=x#y").unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.stripe.com/v1/subscriptions/sub_1%2F..%2Fcustomers%3Fexpand=x%23y"
        );
        assert!(url.query().is_none());
        assert_eq!(url.path_segments().map(|s| s.count()), Some(3));
    }

    #[test]
    fn subscription_url_rejects_unusable_base() {
        let err = subscription_url("not a url", "sub_1").unwrap_err();
        assert_eq!(err.code, PaymentErrorCode::ProviderError);
    }

    #[tokio::test]
    async fn get_subscription_unreachable_host_is_network_error() {
        let adapter =
            StripePaymentAdapter::new(test_config().with_base_url("http://127.0.0.1:9"));

        let err = adapter.get_subscription("sub_1").await.unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::NetworkError);
    }
}
