//! Provider-side objects, as seen by the reconciliation logic.
//!
//! These are provider-neutral snapshots. The Stripe adapter converts its
//! wire types into them after verification; nothing past the adapter sees
//! provider JSON.

use std::collections::HashMap;

use crate::domain::foundation::{Timestamp, UserId};

use super::status::SubscriptionStatus;
use super::subscription::BillingState;

/// Metadata key carrying the local user identity.
pub const METADATA_USER_ID: &str = "user_id";

/// Metadata key carrying an explicit local plan id.
pub const METADATA_PLAN_ID: &str = "plan_id";

/// A subscription as the provider currently reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    /// Price ids of the subscription items, in provider order.
    pub item_price_ids: Vec<String>,
    /// Legacy single-plan id, sent by older API versions.
    pub legacy_plan_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl RemoteSubscription {
    /// Canonical fields owned by the period/status writer.
    pub fn billing_state(&self) -> BillingState {
        BillingState {
            status: self.status,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            canceled_at: self.canceled_at,
            trial_start: self.trial_start,
            trial_end: self.trial_end,
        }
    }

    /// Price id used for plan mapping: first item, then the legacy plan.
    pub fn primary_price_id(&self) -> Option<&str> {
        self.item_price_ids
            .first()
            .map(String::as_str)
            .or(self.legacy_plan_id.as_deref())
    }

    /// User identity carried in subscription metadata, if any.
    pub fn user_id(&self) -> Option<UserId> {
        metadata_user_id(&self.metadata)
    }

    /// Explicit plan id carried in subscription metadata, unparsed.
    pub fn plan_hint(&self) -> Option<&str> {
        self.metadata.get(METADATA_PLAN_ID).map(String::as_str)
    }
}

/// A completed checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCheckoutSession {
    pub id: String,
    /// `payment`, `setup` or `subscription`.
    pub mode: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub client_reference_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl RemoteCheckoutSession {
    pub fn is_subscription_mode(&self) -> bool {
        self.mode == "subscription"
    }

    /// User identity from metadata, falling back to the client reference id.
    pub fn user_id(&self) -> Option<UserId> {
        metadata_user_id(&self.metadata).or_else(|| {
            self.client_reference_id
                .as_deref()
                .and_then(|id| UserId::new(id).ok())
        })
    }

    pub fn plan_hint(&self) -> Option<&str> {
        self.metadata.get(METADATA_PLAN_ID).map(String::as_str)
    }
}

/// An invoice; only its subscription reference matters here.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteInvoice {
    pub id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

fn metadata_user_id(metadata: &HashMap<String, String>) -> Option<UserId> {
    metadata
        .get(METADATA_USER_ID)
        .and_then(|id| UserId::new(id.as_str()).ok())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Builds a remote subscription with sensible defaults for tests.
    pub fn remote_subscription(id: &str, customer: &str, status: SubscriptionStatus) -> RemoteSubscription {
        RemoteSubscription {
            id: id.to_string(),
            customer_id: customer.to_string(),
            status,
            current_period_start: Timestamp::from_unix(1_704_067_200).unwrap_or_default(),
            current_period_end: Timestamp::from_unix(1_706_745_600).unwrap_or_default(),
            cancel_at_period_end: false,
            canceled_at: None,
            trial_start: None,
            trial_end: None,
            item_price_ids: vec!["price_basic".to_string()],
            legacy_plan_id: None,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::remote_subscription;
    use super::*;

    #[test]
    fn primary_price_prefers_first_item() {
        let mut remote = remote_subscription("sub_1", "cus_1", SubscriptionStatus::Active);
        remote.item_price_ids = vec!["price_a".to_string(), "price_b".to_string()];
        remote.legacy_plan_id = Some("plan_legacy".to_string());

        assert_eq!(remote.primary_price_id(), Some("price_a"));
    }

    #[test]
    fn primary_price_falls_back_to_legacy_plan() {
        let mut remote = remote_subscription("sub_1", "cus_1", SubscriptionStatus::Active);
        remote.item_price_ids.clear();
        remote.legacy_plan_id = Some("plan_legacy".to_string());

        assert_eq!(remote.primary_price_id(), Some("plan_legacy"));
    }

    #[test]
    fn primary_price_is_none_without_items_or_plan() {
        let mut remote = remote_subscription("sub_1", "cus_1", SubscriptionStatus::Active);
        remote.item_price_ids.clear();

        assert_eq!(remote.primary_price_id(), None);
    }

    #[test]
    fn metadata_user_id_ignores_blank_values() {
        let mut remote = remote_subscription("sub_1", "cus_1", SubscriptionStatus::Active);
        remote.metadata.insert(METADATA_USER_ID.to_string(), "  ".to_string());
        assert!(remote.user_id().is_none());

        remote.metadata.insert(METADATA_USER_ID.to_string(), "user-9".to_string());
        assert_eq!(remote.user_id().map(|u| u.to_string()), Some("user-9".to_string()));
    }

    #[test]
    fn checkout_user_falls_back_to_client_reference() {
        let session = RemoteCheckoutSession {
            id: "cs_1".to_string(),
            mode: "subscription".to_string(),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            client_reference_id: Some("user-3".to_string()),
            metadata: HashMap::new(),
        };

        assert!(session.is_subscription_mode());
        assert_eq!(session.user_id().map(|u| u.to_string()), Some("user-3".to_string()));
    }

    #[test]
    fn billing_state_copies_canonical_fields() {
        let mut remote = remote_subscription("sub_1", "cus_1", SubscriptionStatus::Trialing);
        remote.cancel_at_period_end = true;
        let state = remote.billing_state();

        assert_eq!(state.status, SubscriptionStatus::Trialing);
        assert!(state.cancel_at_period_end);
        assert_eq!(state.current_period_end, remote.current_period_end);
    }
}
