//! Webhook processing configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Longest marker retention accepted, in days
pub const MAX_RETENTION_DAYS: u64 = 3650;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Webhook ingestion settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Upper bound on one routed handler, in seconds
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_secs: u64,

    /// Maximum signature age, in seconds
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,

    /// Lease on an in-flight claim, in seconds
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    /// Days processed markers are kept
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Interval between pruning passes, in seconds
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl WebhookConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.handler_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive("handler_timeout_secs"));
        }
        if self.signature_tolerance_secs <= 0 {
            return Err(ValidationError::MustBePositive("signature_tolerance_secs"));
        }
        if self.retention_days == 0 {
            return Err(ValidationError::MustBePositive("retention_days"));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(ValidationError::RetentionTooLong(MAX_RETENTION_DAYS));
        }
        if self.prune_interval_secs == 0 {
            return Err(ValidationError::MustBePositive("prune_interval_secs"));
        }
        // A lease shorter than the handler bound lets a second delivery
        // re-claim an event that is still being processed.
        if self.handler_timeout_secs >= self.claim_lease_secs {
            return Err(ValidationError::TimeoutExceedsLease);
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout(),
            signature_tolerance_secs: default_signature_tolerance(),
            claim_lease_secs: default_claim_lease(),
            retention_days: default_retention_days(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

fn default_handler_timeout() -> u64 {
    10
}

fn default_signature_tolerance() -> i64 {
    300
}

fn default_claim_lease() -> u64 {
    60
}

fn default_retention_days() -> u64 {
    30
}

fn default_prune_interval() -> u64 {
    3600
}
