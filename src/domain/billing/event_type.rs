//! Event types the billing subsystem reacts to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider event types with a registered handler.
///
/// Adding a variant forces a handler to be registered: the routing table
/// is built with an exhaustive match over [`BillingEventType::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingEventType {
    CheckoutSessionCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
}

impl BillingEventType {
    /// Every variant, in routing-table order.
    pub const ALL: [BillingEventType; 6] = [
        BillingEventType::CheckoutSessionCompleted,
        BillingEventType::SubscriptionCreated,
        BillingEventType::SubscriptionUpdated,
        BillingEventType::SubscriptionDeleted,
        BillingEventType::InvoicePaymentSucceeded,
        BillingEventType::InvoicePaymentFailed,
    ];

    /// Parses a provider wire name. Returns `None` for types we do not handle.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checkout.session.completed" => Some(Self::CheckoutSessionCompleted),
            "customer.subscription.created" => Some(Self::SubscriptionCreated),
            "customer.subscription.updated" => Some(Self::SubscriptionUpdated),
            "customer.subscription.deleted" => Some(Self::SubscriptionDeleted),
            "invoice.payment_succeeded" => Some(Self::InvoicePaymentSucceeded),
            "invoice.payment_failed" => Some(Self::InvoicePaymentFailed),
            _ => None,
        }
    }

    /// Returns the provider wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::SubscriptionCreated => "customer.subscription.created",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
        }
    }

    /// True for the `customer.subscription.*` family.
    pub fn is_subscription_event(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionCreated | Self::SubscriptionUpdated | Self::SubscriptionDeleted
        )
    }

    /// True for the `invoice.*` family.
    pub fn is_invoice_event(&self) -> bool {
        matches!(
            self,
            Self::InvoicePaymentSucceeded | Self::InvoicePaymentFailed
        )
    }
}

impl fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
