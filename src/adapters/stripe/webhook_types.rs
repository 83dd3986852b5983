//! Stripe wire types for webhook handling.
//!
//! These types represent Stripe API objects as they arrive in webhook
//! payloads and API responses. They exist only inside the adapter: after
//! verification, [`decode_event`] converts them into provider-neutral
//! domain types and nothing else sees Stripe JSON.
//!
//! Field layouts differ across API versions. Subscription periods moved
//! from the subscription onto its items, and invoices moved their
//! subscription reference under `parent.subscription_details`. Both shapes
//! are accepted.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::billing::{
    BillingEventType, EventPayload, RemoteCheckoutSession, RemoteInvoice, RemoteSubscription,
    SubscriptionStatus, WebhookError, WebhookEvent,
};
use crate::domain::foundation::Timestamp;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Parsed Stripe-Signature header components.
///
/// The header format is `t=timestamp,v1=signature[,v1=signature...][,v0=legacy]`.
/// Several `v1` entries appear while a signing secret is being rolled. Legacy
/// `v0` entries and unknown schemes are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe signed the event.
    pub timestamp: i64,

    /// Every v1 signature (HMAC-SHA256), hex-decoded.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a Stripe-Signature header.
    ///
    /// # Errors
    ///
    /// - `MissingSignature` for an empty header
    /// - `ParseError` for malformed parts, a bad timestamp, bad hex, or no `v1`
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        if header.trim().is_empty() {
            return Err(WebhookError::MissingSignature);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid signature header format".to_string()))?;

            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        WebhookError::ParseError("invalid signature timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value.trim()).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {
                    // v0 and unknown schemes are never trusted
                }
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| WebhookError::ParseError("missing signature timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Raw Stripe webhook event as received from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

/// A reference that Stripe sends either as a bare id or as an expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }

    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe Checkout Session object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    /// Payment mode (payment, setup, subscription).
    pub mode: String,

    pub customer: Option<Expandable>,

    /// Subscription created by the checkout, in subscription mode.
    pub subscription: Option<Expandable>,

    pub client_reference_id: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Stripe Subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    pub customer: Expandable,

    pub status: String,

    /// Present on API versions before periods moved onto items.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    pub canceled_at: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub items: StripeSubscriptionItems,

    /// Legacy single-plan field.
    pub plan: Option<StripePlan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeSubscriptionItems {
    #[serde(default)]
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,

    pub price: Option<StripePrice>,

    /// Present on newer API versions.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePlan {
    pub id: String,
}

/// Stripe Invoice object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    pub customer: Option<Expandable>,

    /// Subscription reference on older API versions.
    pub subscription: Option<Expandable>,

    /// Subscription reference on newer API versions.
    pub parent: Option<StripeInvoiceParent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoiceParent {
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionDetails {
    pub subscription: Option<Expandable>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Conversions to Domain Types
// ════════════════════════════════════════════════════════════════════════════════

fn timestamp(secs: i64, field: &'static str) -> Result<Timestamp, WebhookError> {
    Timestamp::from_unix(secs)
        .ok_or_else(|| WebhookError::InvalidPayload(format!("{} out of range", field)))
}

fn optional_timestamp(
    secs: Option<i64>,
    field: &'static str,
) -> Result<Option<Timestamp>, WebhookError> {
    secs.map(|s| timestamp(s, field)).transpose()
}

impl TryFrom<StripeSubscription> for RemoteSubscription {
    type Error = WebhookError;

    fn try_from(sub: StripeSubscription) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = sub
            .status
            .parse()
            .map_err(|e: crate::domain::foundation::ValidationError| {
                WebhookError::InvalidPayload(e.to_string())
            })?;

        let first_item = sub.items.data.first();
        let period_start = sub
            .current_period_start
            .or_else(|| first_item.and_then(|i| i.current_period_start))
            .ok_or(WebhookError::MissingField("current_period_start"))?;
        let period_end = sub
            .current_period_end
            .or_else(|| first_item.and_then(|i| i.current_period_end))
            .ok_or(WebhookError::MissingField("current_period_end"))?;

        let item_price_ids = sub
            .items
            .data
            .iter()
            .filter_map(|item| item.price.as_ref().map(|p| p.id.clone()))
            .collect();

        Ok(RemoteSubscription {
            customer_id: sub.customer.into_id(),
            status,
            current_period_start: timestamp(period_start, "current_period_start")?,
            current_period_end: timestamp(period_end, "current_period_end")?,
            cancel_at_period_end: sub.cancel_at_period_end,
            canceled_at: optional_timestamp(sub.canceled_at, "canceled_at")?,
            trial_start: optional_timestamp(sub.trial_start, "trial_start")?,
            trial_end: optional_timestamp(sub.trial_end, "trial_end")?,
            item_price_ids,
            legacy_plan_id: sub.plan.map(|p| p.id),
            metadata: sub.metadata,
            id: sub.id,
        })
    }
}

impl From<StripeCheckoutSession> for RemoteCheckoutSession {
    fn from(session: StripeCheckoutSession) -> Self {
        RemoteCheckoutSession {
            id: session.id,
            mode: session.mode,
            customer_id: session.customer.map(Expandable::into_id),
            subscription_id: session.subscription.map(Expandable::into_id),
            client_reference_id: session.client_reference_id,
            metadata: session.metadata,
        }
    }
}

impl From<StripeInvoice> for RemoteInvoice {
    fn from(invoice: StripeInvoice) -> Self {
        let nested = invoice
            .parent
            .and_then(|p| p.subscription_details)
            .and_then(|d| d.subscription);

        RemoteInvoice {
            id: invoice.id,
            customer_id: invoice.customer.map(Expandable::into_id),
            subscription_id: invoice.subscription.or(nested).map(Expandable::into_id),
        }
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(
    object: serde_json::Value,
    what: &str,
) -> Result<T, WebhookError> {
    serde_json::from_value(object)
        .map_err(|e| WebhookError::InvalidPayload(format!("invalid {} object: {}", what, e)))
}

/// Decodes a verified payload into a domain event.
///
/// Only event types with a handler have their object decoded; anything
/// else is carried as raw JSON.
pub fn decode_event(payload: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event: StripeWebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(format!("invalid event JSON: {}", e)))?;

    let created_at = timestamp(event.created, "created")?;
    let object = event.data.object;

    let payload = match BillingEventType::parse(&event.event_type) {
        Some(BillingEventType::CheckoutSessionCompleted) => EventPayload::Checkout(
            decode_object::<StripeCheckoutSession>(object, "checkout session")?.into(),
        ),
        Some(
            BillingEventType::SubscriptionCreated
            | BillingEventType::SubscriptionUpdated
            | BillingEventType::SubscriptionDeleted,
        ) => EventPayload::Subscription(
            decode_object::<StripeSubscription>(object, "subscription")?.try_into()?,
        ),
        Some(BillingEventType::InvoicePaymentSucceeded | BillingEventType::InvoicePaymentFailed) => {
            EventPayload::Invoice(decode_object::<StripeInvoice>(object, "invoice")?.into())
        }
        None => EventPayload::Other(object),
    };

    Ok(WebhookEvent {
        id: event.id,
        event_type: event.event_type,
        created_at,
        livemode: event.livemode,
        payload,
    })
}
