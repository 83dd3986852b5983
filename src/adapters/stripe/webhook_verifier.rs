//! Stripe webhook signature verification.
//!
//! HMAC-SHA256 over `"<t>.<raw body>"`, compared in constant time against
//! every `v1` signature in the header, with a timestamp window to stop
//! replays.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::billing::WebhookError;

use super::webhook_types::SignatureHeader;

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age for a signature (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Maximum allowed clock skew for future timestamps (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Verifier for Stripe webhook signatures.
#[derive(Clone)]
pub struct StripeWebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl StripeWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Overrides the maximum signature age.
    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies the header against the payload using the current time.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Verifies the header against the payload as of `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// - `MissingSignature` / `ParseError` - header absent or malformed
    /// - `TimestampOutOfRange` - signature older than the tolerance
    /// - `InvalidTimestamp` - signature from the future beyond clock skew
    /// - `InvalidSignature` - no `v1` signature matched
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        self.validate_timestamp(header.timestamp, now)?;

        let expected = self.compute_signature(header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));

        if !matched {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    fn validate_timestamp(&self, timestamp: i64, now: i64) -> Result<(), WebhookError> {
        let age = now.saturating_sub(timestamp);

        if age > self.tolerance_secs {
            tracing::warn!(
                event_timestamp = timestamp,
                current_time = now,
                age_secs = age,
                "Webhook signature too old - possible replay"
            );
            return Err(WebhookError::TimestampOutOfRange);
        }

        if age < -MAX_CLOCK_SKEW_SECS {
            tracing::warn!(
                event_timestamp = timestamp,
                current_time = now,
                "Webhook signature from the future - clock skew or manipulation"
            );
            return Err(WebhookError::InvalidTimestamp);
        }

        Ok(())
    }

    /// Computes the HMAC-SHA256 of `"<timestamp>.<payload>"` over raw bytes.
    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a `Stripe-Signature` header value for `payload`.
///
/// Used by the mock provider and by tests that need signed requests.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={}", timestamp),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
