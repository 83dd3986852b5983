//! Local subscription record.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, SubscriptionId, Timestamp, UserId};

use super::status::SubscriptionStatus;

/// Canonical period and status fields, mirrored from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingState {
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
}

/// A stored subscription.
///
/// `provider_subscription_id` is unique but may be re-pointed when the
/// provider replaces the subscription object (forward migration); `id`
/// never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub linked_user_id: Option<UserId>,
    pub plan_id: PlanId,
    pub billing: BillingState,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        self.billing.status
    }

    /// True if the row may be claimed by `user`: linked to them, or not yet linked.
    pub fn is_claimable_by(&self, user: Option<&UserId>) -> bool {
        match (user, &self.linked_user_id) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(wanted), Some(linked)) => wanted == linked,
        }
    }
}

/// Fields for inserting a new subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub linked_user_id: Option<UserId>,
    pub plan_id: PlanId,
    pub billing: BillingState,
}

/// Partial identity update; `None` leaves the stored value untouched.
///
/// Period and status fields are never written through this type; they go
/// through the repository's canonical write together with their history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub plan_id: Option<PlanId>,
    pub linked_user_id: Option<UserId>,
}

impl SubscriptionUpdate {
    pub fn is_empty(&self) -> bool {
        self.plan_id.is_none() && self.linked_user_id.is_none()
    }

    /// Applies the update in place, bumping `updated_at`.
    pub fn apply_to(&self, subscription: &mut Subscription, now: Timestamp) {
        if let Some(plan_id) = self.plan_id {
            subscription.plan_id = plan_id;
        }
        if let Some(user) = &self.linked_user_id {
            subscription.linked_user_id = Some(user.clone());
        }
        subscription.updated_at = now;
    }
}
