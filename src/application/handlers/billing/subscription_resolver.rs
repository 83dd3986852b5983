//! SubscriptionResolver - Finds or creates the local row for a remote subscription.
//!
//! Owns identity, plan and user link. Period and status fields belong to
//! the canonical writer that runs afterwards, so an existing row keeps its
//! stored status here and the writer can see the transition.

use std::sync::Arc;

use crate::domain::billing::{NewSubscription, RemoteSubscription, SubscriptionUpdate, WebhookError};
use crate::domain::foundation::{ErrorCode, SubscriptionId, UserId};
use crate::ports::BillingRepository;

use super::plan_resolver::PlanResolver;

/// What `reconcile_subscription` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// An existing row was found (and possibly updated).
    Existing(SubscriptionId),
    /// A new row was inserted.
    Created(SubscriptionId),
}

impl ReconcileOutcome {
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            ReconcileOutcome::Existing(id) | ReconcileOutcome::Created(id) => *id,
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionResolver {
    repository: Arc<dyn BillingRepository>,
    plans: PlanResolver,
}

impl SubscriptionResolver {
    pub fn new(repository: Arc<dyn BillingRepository>, plans: PlanResolver) -> Self {
        Self { repository, plans }
    }

    /// Reconciles a remote subscription against the customer's local row.
    ///
    /// # Errors
    ///
    /// `UnresolvablePlan` if a row must be created and no plan resolves;
    /// nothing is written in that case.
    pub async fn reconcile_subscription(
        &self,
        remote: &RemoteSubscription,
        provider_customer_id: &str,
        known_user_id: Option<&UserId>,
        plan_hint: Option<&str>,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let existing = self
            .repository
            .find_subscription_by_customer(provider_customer_id, known_user_id)
            .await?;

        if let Some(subscription) = existing {
            let plan_id = self.plans.resolve_plan(plan_hint, remote).await?;
            let update = SubscriptionUpdate {
                plan_id: plan_id.filter(|p| *p != subscription.plan_id),
                linked_user_id: match (&subscription.linked_user_id, known_user_id) {
                    (None, Some(user)) => Some(user.clone()),
                    _ => None,
                },
            };

            if !update.is_empty() {
                self.repository
                    .update_subscription(&subscription.id, &update)
                    .await?;
                tracing::debug!(
                    subscription_id = %subscription.id,
                    plan_changed = update.plan_id.is_some(),
                    user_linked = update.linked_user_id.is_some(),
                    "Reconciled existing subscription"
                );
            }
            return Ok(ReconcileOutcome::Existing(subscription.id));
        }

        let plan_id = self
            .plans
            .resolve_plan(plan_hint, remote)
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    provider_subscription_id = %remote.id,
                    provider_customer_id,
                    price_id = ?remote.primary_price_id(),
                    "Cannot create subscription without a plan"
                );
                WebhookError::UnresolvablePlan {
                    provider_subscription_id: remote.id.clone(),
                    price_id: remote.primary_price_id().map(str::to_string),
                }
            })?;

        let new = NewSubscription {
            provider_subscription_id: remote.id.clone(),
            provider_customer_id: provider_customer_id.to_string(),
            linked_user_id: known_user_id.cloned(),
            plan_id,
            billing: remote.billing_state(),
        };

        match self.repository.create_subscription(&new).await {
            Ok(created) => {
                tracing::info!(
                    subscription_id = %created.id,
                    provider_subscription_id = %created.provider_subscription_id,
                    plan_id = %created.plan_id,
                    "Created subscription"
                );
                Ok(ReconcileOutcome::Created(created.id))
            }
            Err(err) if err.code == ErrorCode::SubscriptionExists => {
                // A concurrent delivery inserted the row first.
                let winner = self
                    .repository
                    .find_subscription_by_provider_id(&remote.id)
                    .await?
                    .ok_or(WebhookError::from(err))?;
                Ok(ReconcileOutcome::Existing(winner.id))
            }
            Err(err) => Err(err.into()),
        }
    }
}
