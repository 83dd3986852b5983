//! PlanResolver - Maps a subscription to a local plan.

use std::sync::Arc;

use crate::domain::billing::{RemoteSubscription, WebhookError};
use crate::domain::foundation::PlanId;
use crate::ports::BillingRepository;

/// Resolves the local plan for a remote subscription.
///
/// An explicit, integer-parseable plan id wins. Otherwise the primary price
/// id is looked up in the plan table.
#[derive(Clone)]
pub struct PlanResolver {
    repository: Arc<dyn BillingRepository>,
}

impl PlanResolver {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Returns `None` when neither source yields a plan.
    pub async fn resolve_plan(
        &self,
        explicit_plan_id: Option<&str>,
        remote: &RemoteSubscription,
    ) -> Result<Option<PlanId>, WebhookError> {
        if let Some(raw) = explicit_plan_id {
            match raw.parse::<PlanId>() {
                Ok(plan_id) => return Ok(Some(plan_id)),
                Err(_) => tracing::debug!(
                    plan_hint = raw,
                    provider_subscription_id = %remote.id,
                    "Ignoring non-numeric plan hint"
                ),
            }
        }

        let Some(price_id) = remote.primary_price_id() else {
            return Ok(None);
        };

        let plan = self.repository.find_plan_by_provider_price_id(price_id).await?;
        Ok(plan.map(|p| p.id))
    }
}
