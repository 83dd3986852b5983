//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `BILLING_WEBHOOKS` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use billing_webhooks::config::AppConfig;
//!
//! # fn main() -> Result<(), billing_webhooks::config::ConfigError> {
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Listening on {}", config.server.socket_addr()?);
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod payment;
mod server;
mod webhook;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};
pub use webhook::WebhookConfig;

use serde::Deserialize;

use crate::adapters::stripe::StripeConfig;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, log filter)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment provider configuration (Stripe)
    pub payment: PaymentConfig,

    /// Webhook processing limits and retention
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BILLING_WEBHOOKS` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_WEBHOOKS__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING_WEBHOOKS__PAYMENT__STRIPE_WEBHOOK_SECRET=...` -> `payment.stripe_webhook_secret`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or unparseable.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_WEBHOOKS")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.webhook.validate()?;
        Ok(())
    }

    /// Stripe adapter configuration, combining payment and webhook settings.
    pub fn stripe_config(&self) -> StripeConfig {
        self.payment
            .to_stripe_config(self.webhook.signature_tolerance_secs)
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("BILLING_WEBHOOKS__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("BILLING_WEBHOOKS__PAYMENT__STRIPE_API_KEY", "sk_test_xxx");
        env::set_var("BILLING_WEBHOOKS__PAYMENT__STRIPE_WEBHOOK_SECRET", "whsec_xxx");
    }

    fn clear_env() {
        for key in [
            "BILLING_WEBHOOKS__DATABASE__URL",
            "BILLING_WEBHOOKS__PAYMENT__STRIPE_API_KEY",
            "BILLING_WEBHOOKS__PAYMENT__STRIPE_WEBHOOK_SECRET",
            "BILLING_WEBHOOKS__SERVER__PORT",
            "BILLING_WEBHOOKS__SERVER__ENVIRONMENT",
            "BILLING_WEBHOOKS__WEBHOOK__HANDLER_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    fn load_with(extra: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
        set_minimal_env();
        for (key, value) in extra {
            env::set_var(key, value);
        }
        let result = AppConfig::load();
        clear_env();
        result
    }

    #[test]
    fn test_load_from_environment() {
        let config = load_with(&[]).unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.payment.stripe_api_key, "sk_test_xxx");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = load_with(&[]).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.webhook.handler_timeout_secs, 10);
        assert_eq!(config.webhook.retention_days, 30);
        assert!(!config.payment.require_livemode);
    }

    #[test]
    fn test_nested_overrides() {
        let config = load_with(&[
            ("BILLING_WEBHOOKS__SERVER__PORT", "3000"),
            ("BILLING_WEBHOOKS__SERVER__ENVIRONMENT", "production"),
            ("BILLING_WEBHOOKS__WEBHOOK__HANDLER_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert_eq!(config.webhook.handler_timeout_secs, 5);
    }

    #[test]
    fn test_stripe_config_carries_livemode_flag() {
        let mut config = load_with(&[]).unwrap();
        config.payment.require_livemode = true;
        assert!(config.stripe_config().require_livemode());
    }
}
