//! BillingRepository port - Typed access to billing state.
//!
//! Reconciliation logic only ever talks to the store through these tagged
//! operations; no query text crosses this boundary.

use async_trait::async_trait;

use crate::domain::billing::{
    BillingState, Customer, NewSubscription, Plan, StatusHistoryEntry, Subscription,
    SubscriptionUpdate,
};
use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, UserId};

/// Repository port for customers, subscriptions, status history and plans.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    // ─── Customers ───────────────────────────────────────────────

    /// Finds a customer by provider customer id.
    async fn find_customer_by_provider_id(
        &self,
        provider_customer_id: &str,
    ) -> Result<Option<Customer>, DomainError>;

    /// Creates a customer.
    ///
    /// If a concurrent delivery created the same provider customer first,
    /// the existing row is returned.
    async fn create_customer(
        &self,
        provider_customer_id: &str,
        linked_user_id: Option<&UserId>,
    ) -> Result<Customer, DomainError>;

    /// Sets the linked user on a customer.
    async fn link_customer_user(
        &self,
        customer_id: &CustomerId,
        user_id: &UserId,
    ) -> Result<(), DomainError>;

    // ─── Subscriptions ───────────────────────────────────────────

    /// Finds a subscription by its current provider subscription id.
    async fn find_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Finds the subscription row of a provider customer.
    ///
    /// When `user_id` is given, only rows linked to that user or not yet
    /// linked match. If several rows match, the most recently updated wins.
    async fn find_subscription_by_customer(
        &self,
        provider_customer_id: &str,
        user_id: Option<&UserId>,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Inserts a new subscription row.
    ///
    /// # Errors
    ///
    /// `SubscriptionExists` if the provider subscription id is taken.
    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, DomainError>;

    /// Applies a partial identity update and returns the stored row.
    async fn update_subscription(
        &self,
        id: &SubscriptionId,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, DomainError>;

    /// Canonical write: overwrites the period and status fields and, when
    /// given, appends the status transition, as one atomic unit.
    ///
    /// Either both land or neither does, so a failed or interrupted write
    /// leaves nothing for a redelivery to duplicate.
    async fn apply_billing_state(
        &self,
        id: &SubscriptionId,
        billing: &BillingState,
        transition: Option<&StatusHistoryEntry>,
    ) -> Result<Subscription, DomainError>;

    /// Re-points a row at a new provider subscription id (forward migration).
    async fn migrate_subscription_provider_id(
        &self,
        id: &SubscriptionId,
        new_provider_subscription_id: &str,
    ) -> Result<(), DomainError>;

    // ─── Status history ──────────────────────────────────────────

    /// Appends a status transition.
    async fn create_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), DomainError>;

    /// Lists a subscription's transitions, oldest first.
    async fn list_status_history(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<StatusHistoryEntry>, DomainError>;

    // ─── Plans ───────────────────────────────────────────────────

    /// Maps a provider price id to a local plan.
    async fn find_plan_by_provider_price_id(
        &self,
        provider_price_id: &str,
    ) -> Result<Option<Plan>, DomainError>;
}
