//! Append-only audit log of subscription status transitions.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SubscriptionId, Timestamp};

use super::status::SubscriptionStatus;

/// One recorded status transition. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub subscription_id: SubscriptionId,
    /// `None` when the row was created by this transition.
    pub from_status: Option<SubscriptionStatus>,
    pub to_status: SubscriptionStatus,
    pub changed_at: Timestamp,
    /// Provider event type that caused the change.
    pub source: String,
}

impl StatusHistoryEntry {
    pub fn new(
        subscription_id: SubscriptionId,
        from_status: Option<SubscriptionStatus>,
        to_status: SubscriptionStatus,
        source: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id,
            from_status,
            to_status,
            changed_at: Timestamp::now(),
            source: source.into(),
        }
    }

    /// Returns an entry only if the status actually changes.
    pub fn for_transition(
        subscription_id: SubscriptionId,
        from_status: Option<SubscriptionStatus>,
        to_status: SubscriptionStatus,
        source: &str,
    ) -> Option<Self> {
        if from_status == Some(to_status) {
            return None;
        }
        Some(Self::new(subscription_id, from_status, to_status, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_entry_when_status_unchanged() {
        let entry = StatusHistoryEntry::for_transition(
            SubscriptionId::new(),
            Some(SubscriptionStatus::Active),
            SubscriptionStatus::Active,
            "customer.subscription.updated",
        );
        assert!(entry.is_none());
    }

    #[test]
    fn entry_when_status_changes() {
        let entry = StatusHistoryEntry::for_transition(
            SubscriptionId::new(),
            Some(SubscriptionStatus::Trialing),
            SubscriptionStatus::Active,
            "customer.subscription.updated",
        )
        .unwrap();

        assert_eq!(entry.from_status, Some(SubscriptionStatus::Trialing));
        assert_eq!(entry.to_status, SubscriptionStatus::Active);
        assert_eq!(entry.source, "customer.subscription.updated");
    }

    #[test]
    fn creation_is_a_transition_from_nothing() {
        let entry = StatusHistoryEntry::for_transition(
            SubscriptionId::new(),
            None,
            SubscriptionStatus::Incomplete,
            "invoice.payment_failed",
        );
        assert!(entry.is_some());
    }
}
