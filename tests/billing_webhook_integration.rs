//! Integration tests for webhook ingestion and subscription reconciliation.
//!
//! These tests drive signed requests through the full stack:
//! 1. Axum router receives the raw body and signature header
//! 2. Mock provider verifies with the real Stripe verifier and decoder
//! 3. Idempotency store claims the event id
//! 4. Event router reconciles customers, subscriptions and status history
//!
//! Uses in-memory stores so no database or network is required.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use proptest::prelude::*;
use serde_json::{json, Value};
use tower::ServiceExt;

use billing_webhooks::adapters::http::{billing_router, BillingAppState};
use billing_webhooks::adapters::memory::{InMemoryBillingRepository, InMemoryProcessedEventStore};
use billing_webhooks::adapters::stripe::MockPaymentProvider;
use billing_webhooks::application::handlers::billing::{
    EventRouter, ProcessWebhookHandler, DEFAULT_CLAIM_LEASE,
};
use billing_webhooks::domain::billing::{RemoteSubscription, SubscriptionStatus};
use billing_webhooks::domain::foundation::{PlanId, Timestamp, UserId};
use billing_webhooks::ports::{
    BillingRepository, PaymentProvider, ProcessedEventStore,
};

const SECRET: &str = "whsec_integration";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    repo: InMemoryBillingRepository,
    store: InMemoryProcessedEventStore,
    provider: MockPaymentProvider,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10)).await
    }

    async fn with_timeout(handler_timeout: Duration) -> Self {
        let repo = InMemoryBillingRepository::new();
        repo.insert_plan(3, "price_basic", "Basic").await;
        repo.insert_plan(4, "price_pro", "Pro").await;
        let store = InMemoryProcessedEventStore::new();
        let provider = MockPaymentProvider::new(SECRET);

        let shared_repo: Arc<dyn BillingRepository> = Arc::new(repo.clone());
        let shared_provider: Arc<dyn PaymentProvider> = Arc::new(provider.clone());
        let shared_store: Arc<dyn ProcessedEventStore> = Arc::new(store.clone());
        let handler = ProcessWebhookHandler::new(
            shared_provider.clone(),
            shared_store,
            Arc::new(EventRouter::new(shared_repo, shared_provider)),
        )
        .with_handler_timeout(handler_timeout);

        Self {
            router: billing_router().with_state(BillingAppState::new(Arc::new(handler))),
            repo,
            store,
            provider,
        }
    }

    /// Posts a correctly signed delivery.
    async fn deliver(&self, payload: &[u8]) -> (StatusCode, String) {
        let signature = self.provider.sign(payload);
        self.post(payload, Some(&signature)).await
    }

    async fn post(&self, payload: &[u8], signature: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method("POST").uri("/webhook");
        if let Some(signature) = signature {
            builder = builder.header("Stripe-Signature", signature);
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::from(payload.to_vec())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

fn envelope(event_id: &str, event_type: &str, object: Value) -> Vec<u8> {
    envelope_with_mode(event_id, event_type, object, false)
}

fn envelope_with_mode(event_id: &str, event_type: &str, object: Value, livemode: bool) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "created": 1_704_067_200,
        "livemode": livemode,
        "api_version": "2024-06-20",
        "data": { "object": object }
    }))
    .unwrap()
}

fn subscription_object(id: &str, customer: &str, status: &str) -> Value {
    json!({
        "id": id,
        "object": "subscription",
        "customer": customer,
        "status": status,
        "current_period_start": 1_704_067_200,
        "current_period_end": 1_706_745_600,
        "cancel_at_period_end": false,
        "canceled_at": null,
        "trial_start": null,
        "trial_end": null,
        "metadata": {},
        "items": { "object": "list", "data": [
            { "id": "si_1", "price": { "id": "price_basic" } }
        ]}
    })
}

fn with_metadata(mut object: Value, key: &str, value: &str) -> Value {
    object["metadata"][key] = json!(value);
    object
}

fn invoice_object(subscription: &str) -> Value {
    json!({
        "id": "in_1",
        "object": "invoice",
        "customer": "cus_1",
        "subscription": subscription
    })
}

fn remote(id: &str, customer: &str, status: SubscriptionStatus) -> RemoteSubscription {
    RemoteSubscription {
        id: id.to_string(),
        customer_id: customer.to_string(),
        status,
        current_period_start: Timestamp::from_unix(1_704_067_200).unwrap(),
        current_period_end: Timestamp::from_unix(1_706_745_600).unwrap(),
        cancel_at_period_end: false,
        canceled_at: None,
        trial_start: None,
        trial_end: None,
        item_price_ids: vec!["price_basic".to_string()],
        legacy_plan_id: None,
        metadata: HashMap::new(),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn scenario_a_created_event_inserts_row_with_explicit_plan() {
    let app = TestApp::new().await;
    let object = with_metadata(subscription_object("sub_1", "cus_1", "trialing"), "plan_id", "7");

    let (status, body) = app
        .deliver(&envelope("evt_a", "customer.subscription.created", object))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"received":true}"#);
    let rows = app.repo.subscriptions().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].provider_customer_id, "cus_1");
    assert_eq!(rows[0].provider_subscription_id, "sub_1");
    assert_eq!(rows[0].plan_id, PlanId::new(7));
    assert_eq!(rows[0].status(), SubscriptionStatus::Trialing);
    assert_eq!(app.repo.customers().await.len(), 1);
}

#[tokio::test]
async fn scenario_b_status_change_appends_history() {
    let app = TestApp::new().await;
    let created = with_metadata(subscription_object("sub_1", "cus_1", "trialing"), "plan_id", "7");
    app.deliver(&envelope("evt_a", "customer.subscription.created", created))
        .await;

    let updated = with_metadata(subscription_object("sub_1", "cus_1", "active"), "plan_id", "7");
    let (status, _) = app
        .deliver(&envelope("evt_b", "customer.subscription.updated", updated))
        .await;

    assert_eq!(status, StatusCode::OK);
    let rows = app.repo.subscriptions().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status(), SubscriptionStatus::Active);

    let history = app.repo.list_status_history(&rows[0].id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, Some(SubscriptionStatus::Trialing));
    assert_eq!(history[0].to_status, SubscriptionStatus::Active);
    assert_eq!(history[0].source, "customer.subscription.updated");
}

#[tokio::test]
async fn scenario_c_new_remote_id_forward_migrates_existing_row() {
    let app = TestApp::new().await;
    let created = with_metadata(subscription_object("sub_1", "cus_1", "active"), "plan_id", "7");
    app.deliver(&envelope("evt_a", "customer.subscription.created", created))
        .await;
    let original_id = app.repo.subscriptions().await[0].id;

    let swapped = subscription_object("sub_2", "cus_1", "active");
    let (status, _) = app
        .deliver(&envelope("evt_c", "customer.subscription.updated", swapped))
        .await;

    assert_eq!(status, StatusCode::OK);
    let rows = app.repo.subscriptions().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, original_id);
    assert_eq!(rows[0].provider_subscription_id, "sub_2");
    assert!(app
        .repo
        .find_subscription_by_provider_id("sub_1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn scenario_d_redelivery_is_duplicate_with_zero_writes() {
    let app = TestApp::new().await;
    let payload = envelope(
        "evt_d",
        "customer.subscription.created",
        subscription_object("sub_1", "cus_1", "active"),
    );
    app.deliver(&payload).await;
    let ops_before = app.repo.operation_count();

    let (status, body) = app.deliver(&payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"received":true,"duplicate":true}"#);
    assert_eq!(app.repo.operation_count(), ops_before);
}

#[tokio::test]
async fn scenario_e_bad_signatures_touch_no_store() {
    let app = TestApp::new().await;
    let payload = envelope(
        "evt_e",
        "customer.subscription.created",
        subscription_object("sub_1", "cus_1", "active"),
    );

    let (missing, missing_body) = app.post(&payload, None).await;
    let (forged, forged_body) = app
        .post(&payload, Some(&format!("t={},v1={}", chrono::Utc::now().timestamp(), "ab".repeat(32))))
        .await;
    let (garbled, _) = app.post(&payload, Some("not-a-signature")).await;

    assert_eq!(missing, StatusCode::BAD_REQUEST);
    assert!(missing_body.starts_with("Webhook Error: "));
    assert_eq!(forged, StatusCode::BAD_REQUEST);
    assert_eq!(forged_body, "Webhook Error: Invalid signature");
    assert_eq!(garbled, StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.operation_count(), 0);
    assert!(!app.store.was_processed("evt_e").await.unwrap());
}

// =============================================================================
// Reconciliation Properties
// =============================================================================

#[tokio::test]
async fn unchanged_status_writes_no_history() {
    let app = TestApp::new().await;
    for (id, event_type) in [
        ("evt_1", "customer.subscription.created"),
        ("evt_2", "customer.subscription.updated"),
        ("evt_3", "customer.subscription.updated"),
    ] {
        app.deliver(&envelope(id, event_type, subscription_object("sub_1", "cus_1", "active")))
            .await;
    }

    assert!(app.repo.history().await.is_empty());
}

#[tokio::test]
async fn unresolvable_plan_fails_without_partial_row_then_recovers() {
    let app = TestApp::new().await;
    let mut object = subscription_object("sub_1", "cus_1", "active");
    object["items"]["data"][0]["price"]["id"] = json!("price_unmapped");
    let payload = envelope("evt_p", "customer.subscription.created", object);

    let (status, body) = app.deliver(&payload).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, r#"{"error":"Webhook processing failed"}"#);
    assert!(app.repo.subscriptions().await.is_empty());
    assert!(!app.store.was_processed("evt_p").await.unwrap());

    app.repo.insert_plan(9, "price_unmapped", "Late").await;
    let (status, _) = app.deliver(&payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.repo.subscriptions().await[0].plan_id, PlanId::new(9));
}

#[tokio::test]
async fn last_applied_event_wins() {
    let app = TestApp::new().await;
    let mut newer = subscription_object("sub_1", "cus_1", "active");
    newer["current_period_end"] = json!(1_709_251_200);
    let older = subscription_object("sub_1", "cus_1", "past_due");

    app.deliver(&envelope("evt_newer", "customer.subscription.updated", newer))
        .await;
    app.deliver(&envelope("evt_older", "customer.subscription.updated", older))
        .await;

    let row = &app.repo.subscriptions().await[0];
    assert_eq!(row.status(), SubscriptionStatus::PastDue);
    assert_eq!(row.billing.current_period_end.as_unix(), 1_706_745_600);
}

#[tokio::test]
async fn checkout_links_user_to_customer_and_subscription() {
    let app = TestApp::new().await;
    app.provider.set_subscription(remote("sub_1", "cus_1", SubscriptionStatus::Active));
    let session = json!({
        "id": "cs_1",
        "object": "checkout.session",
        "mode": "subscription",
        "customer": "cus_1",
        "subscription": "sub_1",
        "client_reference_id": "user-42",
        "metadata": { "plan_id": "4" }
    });

    let (status, _) = app
        .deliver(&envelope("evt_cs", "checkout.session.completed", session))
        .await;

    assert_eq!(status, StatusCode::OK);
    let user = UserId::new("user-42").unwrap();
    assert_eq!(app.repo.customers().await[0].linked_user_id, Some(user.clone()));
    let rows = app.repo.subscriptions().await;
    assert_eq!(rows[0].linked_user_id, Some(user));
    assert_eq!(rows[0].plan_id, PlanId::new(4));
}

#[tokio::test]
async fn payment_mode_checkout_is_acknowledged_without_writes() {
    let app = TestApp::new().await;
    let session = json!({
        "id": "cs_2",
        "object": "checkout.session",
        "mode": "payment",
        "customer": "cus_1",
        "metadata": {}
    });

    let (status, _) = app
        .deliver(&envelope("evt_pay", "checkout.session.completed", session))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.repo.operation_count(), 0);
    assert!(app.store.was_processed("evt_pay").await.unwrap());
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn timeout_is_not_marked_and_redelivery_succeeds() {
    let app = TestApp::with_timeout(Duration::from_millis(50)).await;
    app.provider.set_subscription(remote("sub_1", "cus_1", SubscriptionStatus::PastDue));
    app.provider.set_fetch_delay(Some(Duration::from_millis(500)));
    let payload = envelope("evt_t", "invoice.payment_failed", invoice_object("sub_1"));

    let (status, _) = app.deliver(&payload).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.store.was_processed("evt_t").await.unwrap());

    app.provider.set_fetch_delay(None);
    let (status, _) = app.deliver(&payload).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.store.was_processed("evt_t").await.unwrap());
    assert_eq!(
        app.repo.subscriptions().await[0].status(),
        SubscriptionStatus::PastDue
    );
}

#[tokio::test]
async fn concurrent_in_flight_delivery_is_retryable() {
    let app = TestApp::new().await;
    app.store
        .try_claim("evt_i", "customer.subscription.updated", DEFAULT_CLAIM_LEASE)
        .await
        .unwrap();

    let (status, _) = app
        .deliver(&envelope(
            "evt_i",
            "customer.subscription.updated",
            subscription_object("sub_1", "cus_1", "active"),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.repo.operation_count(), 0);
}

#[tokio::test]
async fn repository_failure_is_retryable_and_not_marked() {
    let app = TestApp::new().await;
    app.repo.set_fail_writes(true);
    let payload = envelope(
        "evt_f",
        "customer.subscription.created",
        subscription_object("sub_1", "cus_1", "active"),
    );

    let (status, _) = app.deliver(&payload).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.store.was_processed("evt_f").await.unwrap());

    app.repo.set_fail_writes(false);
    let (status, _) = app.deliver(&payload).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_status_write_leaves_single_transition_after_redelivery() {
    let app = TestApp::new().await;
    app.deliver(&envelope(
        "evt_created",
        "customer.subscription.created",
        subscription_object("sub_1", "cus_1", "trialing"),
    ))
    .await;
    app.repo.fail_next_billing_writes(1);
    let payload = envelope(
        "evt_activated",
        "customer.subscription.updated",
        subscription_object("sub_1", "cus_1", "active"),
    );

    let (first, _) = app.deliver(&payload).await;
    let (second, _) = app.deliver(&payload).await;
    let (third, third_body) = app.deliver(&payload).await;

    assert_eq!(first, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(third, StatusCode::OK);
    assert_eq!(third_body, r#"{"received":true,"duplicate":true}"#);
    let history: Vec<_> = app
        .repo
        .history()
        .await
        .into_iter()
        .map(|h| (h.from_status, h.to_status))
        .collect();
    assert_eq!(
        history,
        vec![(Some(SubscriptionStatus::Trialing), SubscriptionStatus::Active)]
    );
    assert_eq!(
        app.repo.subscriptions().await[0].status(),
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged_and_marked() {
    let app = TestApp::new().await;

    let (status, _) = app
        .deliver(&envelope("evt_u", "payout.paid", json!({ "id": "po_1" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.store.was_processed("evt_u").await.unwrap());
    assert_eq!(app.store.event_type_of("evt_u").await.as_deref(), Some("payout.paid"));
    assert_eq!(app.repo.operation_count(), 0);
}

#[tokio::test]
async fn test_mode_event_rejected_when_livemode_required() {
    let app = TestApp::new().await;
    app.provider.set_require_livemode(true);

    let (test_mode, _) = app
        .deliver(&envelope_with_mode(
            "evt_test",
            "customer.subscription.created",
            subscription_object("sub_1", "cus_1", "active"),
            false,
        ))
        .await;
    let (live, _) = app
        .deliver(&envelope_with_mode(
            "evt_live",
            "customer.subscription.created",
            subscription_object("sub_1", "cus_1", "active"),
            true,
        ))
        .await;

    assert_eq!(test_mode, StatusCode::BAD_REQUEST);
    assert_eq!(live, StatusCode::OK);
}

#[tokio::test]
async fn verified_but_undecodable_events_are_left_for_redelivery() {
    let app = TestApp::new().await;
    let mut no_periods = subscription_object("sub_1", "cus_1", "active");
    no_periods.as_object_mut().unwrap().remove("current_period_start");
    let checkout_without_subscription = json!({
        "id": "cs_3",
        "object": "checkout.session",
        "mode": "subscription",
        "customer": "cus_1",
        "metadata": {}
    });

    for (event_id, event_type, object) in [
        (
            "evt_frozen",
            "customer.subscription.updated",
            subscription_object("sub_1", "cus_1", "frozen"),
        ),
        ("evt_no_period", "customer.subscription.updated", no_periods),
        (
            "evt_no_sub",
            "checkout.session.completed",
            checkout_without_subscription,
        ),
    ] {
        let (status, body) = app.deliver(&envelope(event_id, event_type, object)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", event_id);
        assert_eq!(body, r#"{"error":"Webhook processing failed"}"#);
        assert!(!app.store.was_processed(event_id).await.unwrap());
    }
    assert!(app.repo.subscriptions().await.is_empty());
    assert!(app.repo.history().await.is_empty());
}

// =============================================================================
// Idempotency Property
// =============================================================================

fn arb_status() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("trialing"),
        Just("active"),
        Just("past_due"),
        Just("canceled"),
        Just("unpaid"),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// N deliveries of one event leave the same state as a single delivery.
    #[test]
    fn prop_repeated_delivery_equals_single_delivery(
        deliveries in 1usize..6,
        initial in arb_status(),
        next in arb_status(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (once, many) = runtime.block_on(async {
            let mut snapshots = Vec::new();
            for repeat in [1, deliveries] {
                let app = TestApp::new().await;
                app.deliver(&envelope(
                    "evt_seed",
                    "customer.subscription.created",
                    subscription_object("sub_1", "cus_1", initial),
                ))
                .await;

                let payload = envelope(
                    "evt_under_test",
                    "customer.subscription.updated",
                    subscription_object("sub_1", "cus_1", next),
                );
                for _ in 0..repeat {
                    let (status, _) = app.deliver(&payload).await;
                    assert_eq!(status, StatusCode::OK);
                }

                let rows = app.repo.subscriptions().await;
                let history: Vec<_> = app
                    .repo
                    .history()
                    .await
                    .into_iter()
                    .map(|h| (h.from_status, h.to_status, h.source))
                    .collect();
                snapshots.push((
                    rows.len(),
                    rows[0].billing.clone(),
                    rows[0].plan_id,
                    rows[0].provider_subscription_id.clone(),
                    history,
                    app.store.processed_count().await,
                ));
            }
            (snapshots[0].clone(), snapshots[1].clone())
        });

        prop_assert_eq!(once, many);
    }
}
