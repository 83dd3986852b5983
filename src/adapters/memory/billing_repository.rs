//! In-memory BillingRepository.
//!
//! Single-process store for tests and local development. Counts reads and
//! writes so callers can assert that a request touched nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{
    BillingState, Customer, NewSubscription, Plan, StatusHistoryEntry, Subscription, SubscriptionUpdate,
};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::BillingRepository;

#[derive(Debug, Default)]
struct State {
    customers: HashMap<CustomerId, Customer>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    history: Vec<StatusHistoryEntry>,
    plans: HashMap<String, Plan>,
}

/// In-memory billing store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingRepository {
    state: Arc<RwLock<State>>,
    reads: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
    fail_writes: Arc<AtomicBool>,
    failing_billing_writes: Arc<AtomicU64>,
}

impl InMemoryBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a plan mapping (plans are read-only through the port).
    pub async fn insert_plan(&self, id: i64, provider_price_id: &str, name: &str) {
        let plan = Plan::new(PlanId::new(id), provider_price_id, name);
        self.state
            .write()
            .await
            .plans
            .insert(provider_price_id.to_string(), plan);
    }

    /// Makes every subsequent write fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` canonical writes fail.
    pub fn fail_next_billing_writes(&self, count: u64) {
        self.failing_billing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of read operations served.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write operations attempted.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total port operations, reads and writes.
    pub fn operation_count(&self) -> u64 {
        self.read_count() + self.write_count()
    }

    /// All subscription rows, oldest first.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let mut rows: Vec<_> = self.state.read().await.subscriptions.values().cloned().collect();
        rows.sort_by_key(|s| s.created_at);
        rows
    }

    pub async fn customers(&self) -> Vec<Customer> {
        self.state.read().await.customers.values().cloned().collect()
    }

    /// The whole status history, in insertion order.
    pub async fn history(&self) -> Vec<StatusHistoryEntry> {
        self.state.read().await.history.clone()
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn record_write(&self) -> Result<(), DomainError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingRepository for InMemoryBillingRepository {
    async fn find_customer_by_provider_id(
        &self,
        provider_customer_id: &str,
    ) -> Result<Option<Customer>, DomainError> {
        self.record_read();
        let state = self.state.read().await;
        Ok(state
            .customers
            .values()
            .find(|c| c.provider_customer_id == provider_customer_id)
            .cloned())
    }

    async fn create_customer(
        &self,
        provider_customer_id: &str,
        linked_user_id: Option<&UserId>,
    ) -> Result<Customer, DomainError> {
        self.record_write()?;
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .customers
            .values()
            .find(|c| c.provider_customer_id == provider_customer_id)
        {
            return Ok(existing.clone());
        }
        let customer = Customer::new(provider_customer_id, linked_user_id.cloned());
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn link_customer_user(
        &self,
        customer_id: &CustomerId,
        user_id: &UserId,
    ) -> Result<(), DomainError> {
        self.record_write()?;
        let mut state = self.state.write().await;
        let customer = state.customers.get_mut(customer_id).ok_or_else(|| {
            DomainError::new(ErrorCode::CustomerNotFound, "Customer not found")
                .with_detail("customer_id", customer_id.to_string())
        })?;
        customer.linked_user_id = Some(user_id.clone());
        Ok(())
    }

    async fn find_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        self.record_read();
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn find_subscription_by_customer(
        &self,
        provider_customer_id: &str,
        user_id: Option<&UserId>,
    ) -> Result<Option<Subscription>, DomainError> {
        self.record_read();
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.provider_customer_id == provider_customer_id)
            .filter(|s| s.is_claimable_by(user_id))
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn create_subscription(
        &self,
        new: &NewSubscription,
    ) -> Result<Subscription, DomainError> {
        self.record_write()?;
        let mut state = self.state.write().await;
        if state
            .subscriptions
            .values()
            .any(|s| s.provider_subscription_id == new.provider_subscription_id)
        {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                "Provider subscription id already stored",
            )
            .with_detail("provider_subscription_id", new.provider_subscription_id.clone()));
        }
        let now = Timestamp::now();
        let subscription = Subscription {
            id: SubscriptionId::new(),
            provider_subscription_id: new.provider_subscription_id.clone(),
            provider_customer_id: new.provider_customer_id.clone(),
            linked_user_id: new.linked_user_id.clone(),
            plan_id: new.plan_id,
            billing: new.billing.clone(),
            created_at: now,
            updated_at: now,
        };
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(
        &self,
        id: &SubscriptionId,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription, DomainError> {
        self.record_write()?;
        let mut state = self.state.write().await;
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| subscription_not_found(id))?;
        update.apply_to(subscription, Timestamp::now());
        Ok(subscription.clone())
    }

    async fn apply_billing_state(
        &self,
        id: &SubscriptionId,
        billing: &BillingState,
        transition: Option<&StatusHistoryEntry>,
    ) -> Result<Subscription, DomainError> {
        self.record_write()?;
        if self
            .failing_billing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DomainError::database("injected billing write failure"));
        }

        // One lock for both writes: the history row and the overwrite land together.
        let mut state = self.state.write().await;
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| subscription_not_found(id))?;
        subscription.billing = billing.clone();
        subscription.updated_at = Timestamp::now();
        let stored = subscription.clone();
        if let Some(entry) = transition {
            state.history.push(entry.clone());
        }
        Ok(stored)
    }

    async fn migrate_subscription_provider_id(
        &self,
        id: &SubscriptionId,
        new_provider_subscription_id: &str,
    ) -> Result<(), DomainError> {
        self.record_write()?;
        let mut state = self.state.write().await;
        if state
            .subscriptions
            .values()
            .any(|s| s.id != *id && s.provider_subscription_id == new_provider_subscription_id)
        {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                "Provider subscription id already stored",
            ));
        }
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| subscription_not_found(id))?;
        subscription.provider_subscription_id = new_provider_subscription_id.to_string();
        subscription.updated_at = Timestamp::now();
        Ok(())
    }

    async fn create_status_history(&self, entry: &StatusHistoryEntry) -> Result<(), DomainError> {
        self.record_write()?;
        self.state.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn list_status_history(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<StatusHistoryEntry>, DomainError> {
        self.record_read();
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.subscription_id == *subscription_id)
            .cloned()
            .collect())
    }

    async fn find_plan_by_provider_price_id(
        &self,
        provider_price_id: &str,
    ) -> Result<Option<Plan>, DomainError> {
        self.record_read();
        Ok(self.state.read().await.plans.get(provider_price_id).cloned())
    }
}

fn subscription_not_found(id: &SubscriptionId) -> DomainError {
    DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
        .with_detail("subscription_id", id.to_string())
}
