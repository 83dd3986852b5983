//! PeriodStatusUpserter - The canonical writer for period and status fields.
//!
//! Every event that changes billing state ends here. The row is located in
//! three tiers, first match wins:
//!
//! 1. by provider subscription id
//! 2. by provider customer (narrowed by the metadata user), re-pointing the
//!    row at the new provider id (forward migration)
//! 3. created from the remote object, which requires a plan
//!
//! A status change appends one history row in the same atomic write as
//! the overwrite.

use std::sync::Arc;

use crate::domain::billing::{
    NewSubscription, RemoteSubscription, StatusHistoryEntry, Subscription, SubscriptionStatus,
    WebhookError,
};
use crate::domain::foundation::{ErrorCode, SubscriptionId};
use crate::ports::BillingRepository;

use super::plan_resolver::PlanResolver;

/// How the row was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Matched by provider subscription id.
    Direct,
    /// Matched by customer and re-pointed from the old provider id.
    Migrated { from: String },
    /// No row existed; one was created.
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub subscription_id: SubscriptionId,
    pub resolution: Resolution,
    pub status_changed: bool,
}

#[derive(Clone)]
pub struct PeriodStatusUpserter {
    repository: Arc<dyn BillingRepository>,
    plans: PlanResolver,
}

impl PeriodStatusUpserter {
    pub fn new(repository: Arc<dyn BillingRepository>, plans: PlanResolver) -> Self {
        Self { repository, plans }
    }

    /// Writes the remote period and status fields onto the local row.
    ///
    /// `source` is the provider event type, recorded on history rows.
    pub async fn upsert_periods_and_status(
        &self,
        remote: &RemoteSubscription,
        source: &str,
    ) -> Result<UpsertOutcome, WebhookError> {
        let (subscription, resolution) = self.locate(remote).await?;

        let stored_status: Option<SubscriptionStatus> = match resolution {
            Resolution::Created => None,
            _ => Some(subscription.status()),
        };

        let transition =
            StatusHistoryEntry::for_transition(subscription.id, stored_status, remote.status, source);
        let status_changed = transition.is_some();

        self.repository
            .apply_billing_state(&subscription.id, &remote.billing_state(), transition.as_ref())
            .await?;

        if let Some(entry) = &transition {
            tracing::info!(
                subscription_id = %subscription.id,
                from = ?entry.from_status,
                to = %entry.to_status,
                source,
                "Subscription status changed"
            );
        }

        Ok(UpsertOutcome {
            subscription_id: subscription.id,
            resolution,
            status_changed,
        })
    }

    async fn locate(
        &self,
        remote: &RemoteSubscription,
    ) -> Result<(Subscription, Resolution), WebhookError> {
        if let Some(found) = self
            .repository
            .find_subscription_by_provider_id(&remote.id)
            .await?
        {
            return Ok((found, Resolution::Direct));
        }

        let user = remote.user_id();
        if let Some(found) = self
            .repository
            .find_subscription_by_customer(&remote.customer_id, user.as_ref())
            .await?
        {
            let from = found.provider_subscription_id.clone();
            self.repository
                .migrate_subscription_provider_id(&found.id, &remote.id)
                .await?;
            tracing::info!(
                subscription_id = %found.id,
                from_provider_subscription_id = %from,
                to_provider_subscription_id = %remote.id,
                "Forward-migrated subscription"
            );
            return Ok((found, Resolution::Migrated { from }));
        }

        self.create(remote).await
    }

    async fn create(
        &self,
        remote: &RemoteSubscription,
    ) -> Result<(Subscription, Resolution), WebhookError> {
        let plan_id = self
            .plans
            .resolve_plan(remote.plan_hint(), remote)
            .await?
            .ok_or_else(|| WebhookError::UnresolvablePlan {
                provider_subscription_id: remote.id.clone(),
                price_id: remote.primary_price_id().map(str::to_string),
            })?;

        let new = NewSubscription {
            provider_subscription_id: remote.id.clone(),
            provider_customer_id: remote.customer_id.clone(),
            linked_user_id: remote.user_id(),
            plan_id,
            billing: remote.billing_state(),
        };

        match self.repository.create_subscription(&new).await {
            Ok(created) => {
                tracing::info!(
                    subscription_id = %created.id,
                    provider_subscription_id = %created.provider_subscription_id,
                    "Created subscription from remote state"
                );
                Ok((created, Resolution::Created))
            }
            Err(err) if err.code == ErrorCode::SubscriptionExists => {
                let winner = self
                    .repository
                    .find_subscription_by_provider_id(&remote.id)
                    .await?
                    .ok_or(WebhookError::from(err))?;
                Ok((winner, Resolution::Direct))
            }
            Err(err) => Err(err.into()),
        }
    }
}
