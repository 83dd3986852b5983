//! Verified, decoded webhook event.

use crate::domain::foundation::Timestamp;

use super::event_type::BillingEventType;
use super::remote::{RemoteCheckoutSession, RemoteInvoice, RemoteSubscription};

/// Typed payload of a verified event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Checkout(RemoteCheckoutSession),
    Subscription(RemoteSubscription),
    Invoice(RemoteInvoice),
    /// Event types without a handler; kept raw and never decoded.
    Other(serde_json::Value),
}

/// An authenticated provider event.
///
/// Only constructed after signature verification succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Provider-assigned event id; the idempotency key.
    pub id: String,
    /// Wire name, kept verbatim so unhandled types can be logged and marked.
    pub event_type: String,
    pub created_at: Timestamp,
    pub livemode: bool,
    pub payload: EventPayload,
}

impl WebhookEvent {
    /// Handled event type, or `None` for types outside the routing table.
    pub fn kind(&self) -> Option<BillingEventType> {
        BillingEventType::parse(&self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_known_types() {
        let event = WebhookEvent {
            id: "evt_1".to_string(),
            event_type: "customer.subscription.deleted".to_string(),
            created_at: Timestamp::now(),
            livemode: false,
            payload: EventPayload::Other(serde_json::json!({})),
        };
        assert_eq!(event.kind(), Some(BillingEventType::SubscriptionDeleted));
    }

    #[test]
    fn kind_is_none_for_unknown_types() {
        let event = WebhookEvent {
            id: "evt_2".to_string(),
            event_type: "payout.paid".to_string(),
            created_at: Timestamp::now(),
            livemode: true,
            payload: EventPayload::Other(serde_json::json!({"id": "po_1"})),
        };
        assert!(event.kind().is_none());
    }
}
