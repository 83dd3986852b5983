//! Mock payment provider for testing.
//!
//! Verifies webhooks with the real Stripe verifier and decoder, so tests
//! exercise genuine signatures, but serves subscription lookups from an
//! in-process map. Supports:
//! - Pre-configured subscriptions
//! - Error and latency injection on lookups
//! - Call counting

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::domain::billing::{RemoteSubscription, WebhookError, WebhookEvent};
use crate::ports::{PaymentError, PaymentProvider};

use super::stripe_adapter::enforce_livemode;
use super::webhook_types::decode_event;
use super::webhook_verifier::{sign_payload, StripeWebhookVerifier};

/// Mock payment provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new("whsec_test");
/// mock.set_subscription(remote);
/// let header = mock.sign(body.as_bytes());
/// let event = mock.verify_webhook(body.as_bytes(), &header).await?;
/// ```
#[derive(Clone)]
pub struct MockPaymentProvider {
    secret: String,
    verifier: StripeWebhookVerifier,
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, RemoteSubscription>,
    fetch_error: Option<PaymentError>,
    fetch_delay: Option<Duration>,
    require_livemode: bool,
    verify_calls: u64,
    fetch_calls: u64,
}

impl MockPaymentProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        let secret = webhook_secret.into();
        Self {
            verifier: StripeWebhookVerifier::new(SecretString::new(secret.clone())),
            secret,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Registers (or replaces) a subscription served by `get_subscription`.
    pub fn set_subscription(&self, subscription: RemoteSubscription) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Makes every `get_subscription` call fail until cleared.
    pub fn set_fetch_error(&self, error: Option<PaymentError>) {
        self.state().fetch_error = error;
    }

    /// Delays every `get_subscription` call.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state().fetch_delay = delay;
    }

    pub fn set_require_livemode(&self, require: bool) {
        self.state().require_livemode = require;
    }

    /// Signs `payload` with the mock's secret at the current time.
    pub fn sign(&self, payload: &[u8]) -> String {
        sign_payload(&self.secret, chrono::Utc::now().timestamp(), payload)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn verify_calls(&self) -> u64 {
        self.state().verify_calls
    }

    pub fn fetch_calls(&self) -> u64 {
        self.state().fetch_calls
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        let require_livemode = {
            let mut state = self.state();
            state.verify_calls += 1;
            state.require_livemode
        };

        self.verifier.verify(payload, signature)?;
        let event = decode_event(payload)?;
        enforce_livemode(&event, require_livemode)?;
        Ok(event)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<RemoteSubscription>, PaymentError> {
        let (delay, outcome) = {
            let mut state = self.state();
            state.fetch_calls += 1;
            let outcome = match &state.fetch_error {
                Some(err) => Err(err.clone()),
                None => Ok(state.subscriptions.get(subscription_id).cloned()),
            };
            (state.fetch_delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
