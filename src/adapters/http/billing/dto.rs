//! HTTP DTOs for the webhook endpoint.
//!
//! The provider only looks at the status code; the bodies exist for
//! operators reading delivery logs in the provider dashboard.

use serde::Serialize;

/// Acknowledgement returned with 200.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAckResponse {
    pub received: bool,
    /// Present only for redeliveries of an already processed event.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl WebhookAckResponse {
    pub fn processed() -> Self {
        Self {
            received: true,
            duplicate: false,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            received: true,
            duplicate: true,
        }
    }
}

/// Body of a 500 response. Deliberately generic.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn processing_failed() -> Self {
        Self {
            error: "Webhook processing failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
