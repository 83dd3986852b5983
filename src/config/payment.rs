//! Payment provider configuration

use secrecy::SecretString;
use serde::Deserialize;

use crate::adapters::stripe::StripeConfig;

use super::error::ValidationError;

/// Payment configuration (Stripe)
///
/// Secrets stay plain strings only inside this struct; they are wrapped in
/// `SecretString` when handed to the adapter.
#[derive(Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Stripe API key, used for subscription lookups
    pub stripe_api_key: String,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,

    /// Override for the Stripe API base URL (tests, proxies)
    pub api_base_url: Option<String>,

    /// Reject events whose `livemode` is false
    #[serde(default)]
    pub require_livemode: bool,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("stripe_api_key", &"[REDACTED]")
            .field("stripe_webhook_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("require_livemode", &self.require_livemode)
            .finish()
    }
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_") || self.stripe_api_key.starts_with("rk_test_")
    }

    /// Builds the adapter configuration.
    pub fn to_stripe_config(&self, signature_tolerance_secs: i64) -> StripeConfig {
        let config = StripeConfig::new(
            SecretString::new(self.stripe_api_key.clone()),
            SecretString::new(self.stripe_webhook_secret.clone()),
        )
        .with_require_livemode(self.require_livemode)
        .with_signature_tolerance_secs(signature_tolerance_secs);

        match &self.api_base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }

        // Secret and restricted keys only; publishable keys cannot read subscriptions
        if !self.stripe_api_key.starts_with("sk_") && !self.stripe_api_key.starts_with("rk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if let Some(url) = &self.api_base_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ValidationError::InvalidStripeBaseUrl);
            }
        }

        Ok(())
    }
}
