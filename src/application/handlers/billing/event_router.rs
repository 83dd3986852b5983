//! EventRouter - Dispatches verified events to their handlers.
//!
//! The routing table is built from an exhaustive match over
//! `BillingEventType`, so adding a variant without a handler does not compile.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{
    BillingEventType, EventPayload, RemoteCheckoutSession, RemoteInvoice, RemoteSubscription,
    WebhookError, WebhookEvent,
};
use crate::domain::foundation::{SubscriptionId, UserId};
use crate::ports::{BillingRepository, PaymentProvider};

use super::customer_linker::CustomerLinker;
use super::period_status_upserter::PeriodStatusUpserter;
use super::plan_resolver::PlanResolver;
use super::subscription_resolver::SubscriptionResolver;

/// What a routed handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Local state now mirrors the provider.
    Reconciled {
        subscription_id: SubscriptionId,
        status_changed: bool,
    },
    /// Acknowledged without touching billing state.
    Ignored { reason: String },
}

impl RouteOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        RouteOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

/// Handles one kind of billing event.
#[async_trait]
pub trait BillingEventHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> Result<RouteOutcome, WebhookError>;
}

/// Shared collaborators for the built-in handlers.
#[derive(Clone)]
struct Reconciler {
    provider: Arc<dyn PaymentProvider>,
    customers: CustomerLinker,
    subscriptions: SubscriptionResolver,
    upserter: PeriodStatusUpserter,
}

impl Reconciler {
    fn new(repository: Arc<dyn BillingRepository>, provider: Arc<dyn PaymentProvider>) -> Self {
        let plans = PlanResolver::new(repository.clone());
        Self {
            provider,
            customers: CustomerLinker::new(repository.clone()),
            subscriptions: SubscriptionResolver::new(repository.clone(), plans.clone()),
            upserter: PeriodStatusUpserter::new(repository, plans),
        }
    }

    async fn fetch_subscription(&self, id: &str) -> Result<RemoteSubscription, WebhookError> {
        self.provider
            .get_subscription(id)
            .await?
            .ok_or_else(|| WebhookError::SubscriptionNotFound(id.to_string()))
    }

    async fn reconcile_and_upsert(
        &self,
        remote: &RemoteSubscription,
        user_id: Option<UserId>,
        plan_hint: Option<&str>,
        source: &str,
    ) -> Result<RouteOutcome, WebhookError> {
        self.customers
            .ensure_customer(&remote.customer_id, user_id.as_ref())
            .await?;
        self.subscriptions
            .reconcile_subscription(remote, &remote.customer_id, user_id.as_ref(), plan_hint)
            .await?;
        self.upsert(remote, source).await
    }

    async fn upsert(
        &self,
        remote: &RemoteSubscription,
        source: &str,
    ) -> Result<RouteOutcome, WebhookError> {
        let outcome = self.upserter.upsert_periods_and_status(remote, source).await?;
        Ok(RouteOutcome::Reconciled {
            subscription_id: outcome.subscription_id,
            status_changed: outcome.status_changed,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════

struct CheckoutCompletedHandler(Reconciler);

#[async_trait]
impl BillingEventHandler for CheckoutCompletedHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<RouteOutcome, WebhookError> {
        let session: &RemoteCheckoutSession = match &event.payload {
            EventPayload::Checkout(session) => session,
            _ => return Err(payload_mismatch(event)),
        };

        if !session.is_subscription_mode() {
            return Ok(RouteOutcome::ignored(format!(
                "checkout mode '{}' has no subscription",
                session.mode
            )));
        }

        let subscription_id = session
            .subscription_id
            .as_deref()
            .ok_or(WebhookError::MissingField("subscription"))?;
        if session.customer_id.is_none() {
            return Err(WebhookError::MissingField("customer"));
        }

        let remote = self.0.fetch_subscription(subscription_id).await?;
        let user_id = session.user_id().or_else(|| remote.user_id());
        let plan_hint = session.plan_hint().or_else(|| remote.plan_hint());

        self.0
            .reconcile_and_upsert(&remote, user_id, plan_hint, &event.event_type)
            .await
    }
}

struct SubscriptionChangedHandler(Reconciler);

#[async_trait]
impl BillingEventHandler for SubscriptionChangedHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<RouteOutcome, WebhookError> {
        let EventPayload::Subscription(remote) = &event.payload else {
            return Err(payload_mismatch(event));
        };
        self.0
            .reconcile_and_upsert(remote, remote.user_id(), remote.plan_hint(), &event.event_type)
            .await
    }
}

struct SubscriptionDeletedHandler(Reconciler);

#[async_trait]
impl BillingEventHandler for SubscriptionDeletedHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<RouteOutcome, WebhookError> {
        let EventPayload::Subscription(remote) = &event.payload else {
            return Err(payload_mismatch(event));
        };
        self.0.upsert(remote, &event.event_type).await
    }
}

struct InvoicePaymentHandler(Reconciler);

#[async_trait]
impl BillingEventHandler for InvoicePaymentHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<RouteOutcome, WebhookError> {
        let invoice: &RemoteInvoice = match &event.payload {
            EventPayload::Invoice(invoice) => invoice,
            _ => return Err(payload_mismatch(event)),
        };

        let Some(subscription_id) = invoice.subscription_id.as_deref() else {
            return Ok(RouteOutcome::ignored("invoice has no subscription"));
        };

        let remote = self.0.fetch_subscription(subscription_id).await?;
        self.0.upsert(&remote, &event.event_type).await
    }
}

fn payload_mismatch(event: &WebhookEvent) -> WebhookError {
    WebhookError::InvalidPayload(format!(
        "payload of {} does not match its event type",
        event.id
    ))
}

// ════════════════════════════════════════════════════════════════════════════
// Router
// ════════════════════════════════════════════════════════════════════════════

/// Routes events by type.
pub struct EventRouter {
    handlers: HashMap<BillingEventType, Arc<dyn BillingEventHandler>>,
}

impl EventRouter {
    pub fn new(repository: Arc<dyn BillingRepository>, provider: Arc<dyn PaymentProvider>) -> Self {
        let reconciler = Reconciler::new(repository, provider);
        let handlers = BillingEventType::ALL
            .into_iter()
            .map(|event_type| {
                let handler: Arc<dyn BillingEventHandler> = match event_type {
                    BillingEventType::CheckoutSessionCompleted => {
                        Arc::new(CheckoutCompletedHandler(reconciler.clone()))
                    }
                    BillingEventType::SubscriptionCreated
                    | BillingEventType::SubscriptionUpdated => {
                        Arc::new(SubscriptionChangedHandler(reconciler.clone()))
                    }
                    BillingEventType::SubscriptionDeleted => {
                        Arc::new(SubscriptionDeletedHandler(reconciler.clone()))
                    }
                    BillingEventType::InvoicePaymentSucceeded
                    | BillingEventType::InvoicePaymentFailed => {
                        Arc::new(InvoicePaymentHandler(reconciler.clone()))
                    }
                };
                (event_type, handler)
            })
            .collect();

        Self { handlers }
    }

    /// Replaces the handler for one event type.
    pub fn with_handler(
        mut self,
        event_type: BillingEventType,
        handler: Arc<dyn BillingEventHandler>,
    ) -> Self {
        self.handlers.insert(event_type, handler);
        self
    }

    /// Dispatches an event. Types outside the table are acknowledged.
    pub async fn route(&self, event: &WebhookEvent) -> Result<RouteOutcome, WebhookError> {
        let Some(handler) = event.kind().and_then(|kind| self.handlers.get(&kind)) else {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Unhandled webhook event type"
            );
            return Ok(RouteOutcome::ignored(format!(
                "unhandled event type {}",
                event.event_type
            )));
        };

        let outcome = handler.handle(event).await?;
        match &outcome {
            RouteOutcome::Reconciled {
                subscription_id,
                status_changed,
            } => tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                subscription_id = %subscription_id,
                status_changed,
                "Webhook event reconciled"
            ),
            RouteOutcome::Ignored { reason } => tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                reason = %reason,
                "Webhook event ignored"
            ),
        }
        Ok(outcome)
    }
}
