//! CustomerLinker - Lazily creates customers and back-fills user links.

use std::sync::Arc;

use crate::domain::billing::WebhookError;
use crate::domain::foundation::{CustomerId, UserId};
use crate::ports::BillingRepository;

#[derive(Clone)]
pub struct CustomerLinker {
    repository: Arc<dyn BillingRepository>,
}

impl CustomerLinker {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Returns the local customer for a provider customer, creating it if needed.
    ///
    /// A customer that exists but has no user link gets `known_user_id`
    /// attached. An existing link is never overwritten.
    pub async fn ensure_customer(
        &self,
        provider_customer_id: &str,
        known_user_id: Option<&UserId>,
    ) -> Result<CustomerId, WebhookError> {
        let existing = self
            .repository
            .find_customer_by_provider_id(provider_customer_id)
            .await?;

        let Some(customer) = existing else {
            let created = self
                .repository
                .create_customer(provider_customer_id, known_user_id)
                .await?;
            tracing::info!(
                provider_customer_id,
                customer_id = %created.id,
                linked = created.is_linked(),
                "Created billing customer"
            );
            return Ok(created.id);
        };

        match (known_user_id, &customer.linked_user_id) {
            (Some(user), None) => {
                self.repository.link_customer_user(&customer.id, user).await?;
                tracing::info!(
                    provider_customer_id,
                    user_id = %user,
                    "Linked billing customer to user"
                );
            }
            (Some(user), Some(linked)) if user != linked => {
                tracing::warn!(
                    provider_customer_id,
                    linked_user_id = %linked,
                    event_user_id = %user,
                    "Customer already linked to a different user; keeping existing link"
                );
            }
            _ => {}
        }

        Ok(customer.id)
    }
}
