use chrono::{Duration, Utc};
use mealhub_catalog::{InMemoryCatalog, ItemRef, PricingConfig, PricingEngine};
use mealhub_core::geolocation::MockGeolocationGateway;
use mealhub_core::payment::MockPaymentGateway;
use mealhub_order::{
    Actor, Collaborators, CreateOrderRequest, InMemoryStore, LineRequest, Merchant,
    OrchestratorConfig, OrderError, OrderOrchestrator, OrderProjection, OrderStatus,
    UpdateOrderRequest, WebhookOutcome,
};
use std::sync::Arc;
use uuid::Uuid;

const KITCHEN: &str = "14 Ogunlana Drive, Surulere";
const HOME: &str = "2 Bourdillon Road, Ikoyi";
const FAR_HOME: &str = "9 Lekki Phase 1";

struct Harness {
    store: Arc<InMemoryStore>,
    catalog: Arc<InMemoryCatalog>,
    geolocation: Arc<MockGeolocationGateway>,
    payments: Arc<MockPaymentGateway>,
    orchestrator: OrderOrchestrator,
    merchant: Merchant,
    customer_id: Uuid,
    address_id: Uuid,
    jollof: ItemRef,
    zobo: ItemRef,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let geolocation = Arc::new(
        MockGeolocationGateway::new()
            .with_route(KITCHEN, HOME, 1_500)
            .with_route(KITCHEN, FAR_HOME, 9_000)
            .with_route(HOME, KITCHEN, 1_500),
    );
    let payments = Arc::new(MockPaymentGateway::new("whsec_flow"));

    let merchant = Merchant::new("Mama Cass", KITCHEN);
    store.add_merchant(merchant.clone());
    let customer_id = Uuid::new_v4();
    let address_id = store.add_address(customer_id, HOME);

    let jollof = catalog.add_dish(merchant.id, "Jollof Rice", 1_200);
    let zobo = catalog.add_drink(merchant.id, "Zobo", 300);

    let collaborators = Collaborators {
        orders: store.clone(),
        merchants: store.clone(),
        addresses: store.clone(),
        catalog: catalog.clone(),
        geolocation: geolocation.clone(),
        payments: payments.clone(),
    };
    let pricing = PricingEngine::new(PricingConfig {
        base_rate_per_km: 100.0,
        service_fee_rate: 0.10,
    })
    .unwrap();
    let orchestrator =
        OrderOrchestrator::new(collaborators, pricing, OrchestratorConfig::default());

    Harness {
        store,
        catalog,
        geolocation,
        payments,
        orchestrator,
        merchant,
        customer_id,
        address_id,
        jollof,
        zobo,
    }
}

impl Harness {
    fn request(&self) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: self.customer_id,
            address_id: self.address_id,
            cooker_id: None,
            items: vec![LineRequest::for_item(self.jollof, 2)],
            scheduled_delivery_at: None,
        }
    }

    async fn create(&self) -> OrderProjection {
        self.orchestrator.create_order(self.request()).await.unwrap()
    }

    async fn confirm(&self, projection: &OrderProjection) -> WebhookOutcome {
        let auth_ref = projection.order.payment_authorization_ref.clone().unwrap();
        let (payload, signature) =
            self.payments.signed_event("payment_intent.succeeded", &auth_ref);
        self.orchestrator
            .handle_payment_confirmed(&payload, &signature)
            .await
            .unwrap()
    }

    fn cooker(&self) -> Actor {
        Actor::Cooker(self.merchant.id)
    }

    fn customer(&self) -> Actor {
        Actor::Customer(self.customer_id)
    }

    async fn move_to(&self, order_id: Uuid, target: OrderStatus, actor: Actor) -> OrderProjection {
        self.orchestrator
            .apply_status_change(order_id, target, actor)
            .await
            .unwrap()
    }

    /// Create, pay and accept an order
    async fn processing_order(&self) -> Uuid {
        let created = self.create().await;
        self.confirm(&created).await;
        self.move_to(created.order.id, OrderStatus::Processing, self.cooker()).await;
        created.order.id
    }

    fn acceptance_rate(&self) -> f64 {
        self.store.get_merchant(self.merchant.id).unwrap().acceptance_rate
    }
}

#[tokio::test]
async fn test_create_to_cooker_cancel() {
    let h = harness();

    let created = h.create().await;
    let order = &created.order;
    assert_eq!(order.status, OrderStatus::Draft);
    assert_eq!(order.delivery_distance_meters, Some(1_500));
    assert_eq!(created.totals.subtotal, 2_400);
    assert_eq!(created.totals.service_fee, 240);
    assert_eq!(created.totals.delivery_fee, 150);
    assert_eq!(created.totals.total, 2_790);

    let auth_ref = order.payment_authorization_ref.clone().unwrap();
    assert_eq!(h.payments.authorization(&auth_ref).unwrap().amount, 2_790);

    let paid = match h.confirm(&created).await {
        WebhookOutcome::Applied(projection) => projection,
        other => panic!("expected Applied, got {:?}", other),
    };
    assert_eq!(paid.order.status, OrderStatus::Pending);
    assert!(paid.order.paid_at.is_some());

    let accepted = h.move_to(order.id, OrderStatus::Processing, h.cooker()).await;
    assert!(accepted.order.processing_at.is_some());
    assert!(accepted.order.cancelled_at.is_none());

    let cancelled = h.move_to(order.id, OrderStatus::CancelledByCooker, h.cooker()).await;
    assert_eq!(cancelled.order.status, OrderStatus::CancelledByCooker);
    assert!(cancelled.order.cancelled_at.is_some());
    assert_eq!(cancelled.order.paid_at, paid.order.paid_at);

    let refunds = h.payments.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].authorization_ref, auth_ref);
    assert_eq!(refunds[0].amount, 2_400 + 240);

    assert!(h.acceptance_rate() < Merchant::DEFAULT_ACCEPTANCE_RATE);
    assert_eq!(h.acceptance_rate(), 0.0);
}

#[tokio::test]
async fn test_payment_confirmation_is_idempotent() {
    let h = harness();
    let created = h.create().await;

    let first = h.confirm(&created).await;
    assert!(matches!(first, WebhookOutcome::Applied(_)));
    let version = h.orchestrator.get_order(created.order.id).await.unwrap().order.version;

    let second = h.confirm(&created).await;
    match second {
        WebhookOutcome::AlreadyApplied(projection) => {
            assert_eq!(projection.order.status, OrderStatus::Pending);
            assert_eq!(projection.order.version, version);
        }
        other => panic!("expected AlreadyApplied, got {:?}", other),
    }
    assert!(h.payments.refunds().is_empty());
}

#[tokio::test]
async fn test_untrusted_webhook_changes_nothing() {
    let h = harness();
    let created = h.create().await;
    let auth_ref = created.order.payment_authorization_ref.clone().unwrap();

    let (payload, signature) = h.payments.signed_event("payment_intent.succeeded", &auth_ref);
    let mut tampered = payload.clone();
    tampered.extend_from_slice(b" ");

    let err = h
        .orchestrator
        .handle_payment_confirmed(&tampered, &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::UntrustedEvent(_)));

    let err = h
        .orchestrator
        .handle_payment_confirmed(&payload, "t=1,v1=deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::UntrustedEvent(_)));

    let order = h.orchestrator.get_order(created.order.id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Draft);
    assert!(order.paid_at.is_none());
}

#[tokio::test]
async fn test_non_success_events_are_acknowledged() {
    let h = harness();
    let created = h.create().await;
    let auth_ref = created.order.payment_authorization_ref.clone().unwrap();

    let (payload, signature) = h.payments.signed_event("payment_intent.payment_failed", &auth_ref);
    let outcome = h
        .orchestrator
        .handle_payment_confirmed(&payload, &signature)
        .await
        .unwrap();
    assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));

    let order = h.orchestrator.get_order(created.order.id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Draft);
}

#[tokio::test]
async fn test_unknown_authorization() {
    let h = harness();
    let (payload, signature) = h.payments.signed_event("payment_intent.succeeded", "pi_unknown");

    let err = h
        .orchestrator
        .handle_payment_confirmed(&payload, &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::UnknownAuthorization(_)));
}

#[tokio::test]
async fn test_schedule_lead_time() {
    let h = harness();
    let now = Utc::now();

    for too_soon in [now - Duration::seconds(1), now + Duration::minutes(30)] {
        let mut request = h.request();
        request.scheduled_delivery_at = Some(too_soon);
        let err = h.orchestrator.create_order(request).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidSchedule(_)));
    }
    assert_eq!(h.store.order_count(), 0);

    let mut request = h.request();
    request.scheduled_delivery_at = Some(now + Duration::hours(2));
    let created = h.orchestrator.create_order(request).await.unwrap();
    assert!(!created.order.is_asap());
}

#[tokio::test]
async fn test_failed_persist_voids_authorization() {
    let h = harness();
    h.store.set_fail_writes(true);

    let err = h.orchestrator.create_order(h.request()).await.unwrap_err();
    assert!(matches!(err, OrderError::Persistence(_)));
    assert_eq!(h.payments.voided().len(), 1);
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_geolocation_outage_fails_creation() {
    let h = harness();
    h.geolocation.set_unavailable(true);

    let err = h.orchestrator.create_order(h.request()).await.unwrap_err();
    assert!(matches!(err, OrderError::GeolocationUnavailable(_)));
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_payment_outage_fails_creation() {
    let h = harness();
    h.payments.set_failing(true);

    let err = h.orchestrator.create_order(h.request()).await.unwrap_err();
    assert!(matches!(err, OrderError::PaymentProvider(_)));
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn test_update_resizes_authorization() {
    let h = harness();
    let created = h.create().await;
    let auth_ref = created.order.payment_authorization_ref.clone().unwrap();
    let far_address = h.store.add_address(h.customer_id, FAR_HOME);

    let updated = h
        .orchestrator
        .update_order(
            created.order.id,
            h.customer(),
            UpdateOrderRequest {
                items: vec![LineRequest::for_item(h.jollof, 1), LineRequest::for_item(h.zobo, 2)],
                address_id: Some(far_address),
            },
        )
        .await
        .unwrap();

    // 1200 + 600 subtotal, 9 km at ratio 1.4
    assert_eq!(updated.totals.subtotal, 1_800);
    assert_eq!(updated.totals.delivery_fee, 1_260);
    assert_eq!(updated.totals.total, 1_800 + 180 + 1_260);
    assert_eq!(updated.order.address_id, far_address);
    assert_eq!(updated.order.payment_authorization_ref.as_deref(), Some(auth_ref.as_str()));
    assert_eq!(h.payments.authorization(&auth_ref).unwrap().amount, updated.totals.total);
    assert_eq!(updated.order.authorized_amount, updated.totals.total);
}

#[tokio::test]
async fn test_failed_update_restores_authorization() {
    let h = harness();
    let created = h.create().await;
    let auth_ref = created.order.payment_authorization_ref.clone().unwrap();
    let authorized = created.totals.total;

    h.store.set_fail_writes(true);
    let err = h
        .orchestrator
        .update_order(
            created.order.id,
            h.customer(),
            UpdateOrderRequest {
                items: vec![LineRequest::for_item(h.jollof, 5)],
                address_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Persistence(_)));

    // the provider hold matches the stored basket again
    assert_eq!(h.payments.authorization(&auth_ref).unwrap().amount, authorized);
    let stored = h.orchestrator.get_order(created.order.id).await.unwrap();
    assert_eq!(stored.order.authorized_amount, authorized);
    assert_eq!(stored.totals.total, authorized);
}

#[tokio::test]
async fn test_update_rejected_after_payment_and_for_strangers() {
    let h = harness();
    let created = h.create().await;
    let request = UpdateOrderRequest {
        items: vec![LineRequest::for_item(h.zobo, 1)],
        address_id: None,
    };

    let err = h
        .orchestrator
        .update_order(created.order.id, Actor::Customer(Uuid::new_v4()), request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden(_)));

    h.confirm(&created).await;
    let err = h
        .orchestrator
        .update_order(created.order.id, h.customer(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotModifiable { .. }));
}

#[tokio::test]
async fn test_disabled_item_rejected() {
    let h = harness();
    h.catalog.set_enabled(h.jollof, false);

    let err = h.orchestrator.create_order(h.request()).await.unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));
}

#[tokio::test]
async fn test_status_change_guards() {
    let h = harness();
    let created = h.create().await;
    let order_id = created.order.id;

    // payment confirmation is the only way out of DRAFT
    let err = h
        .orchestrator
        .apply_status_change(order_id, OrderStatus::Pending, h.cooker())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden(_)));

    h.confirm(&created).await;

    let err = h
        .orchestrator
        .apply_status_change(order_id, OrderStatus::CancelledByCooker, h.customer())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden(_)));

    let err = h
        .orchestrator
        .apply_status_change(order_id, OrderStatus::Delivered, Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { from: Some(OrderStatus::Pending), .. }));

    let err = h
        .orchestrator
        .apply_status_change(Uuid::new_v4(), OrderStatus::Processing, h.cooker())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { from: None, .. }));

    let order = h.orchestrator.get_order(order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_rolling_window_of_ten() {
    let h = harness();

    for i in 0..10 {
        let order_id = h.processing_order().await;
        if i == 4 {
            h.move_to(order_id, OrderStatus::CancelledByCooker, h.cooker()).await;
        } else {
            h.move_to(order_id, OrderStatus::Completed, h.cooker()).await;
            h.move_to(order_id, OrderStatus::Delivered, Actor::System).await;
        }
    }

    assert_eq!(h.acceptance_rate(), 90.0);
    let merchant = h.store.get_merchant(h.merchant.id).unwrap();
    assert!(merchant.last_acceptance_rate_update_at.is_some());

    // customer cancellations never move the rate
    let order_id = h.processing_order().await;
    h.move_to(order_id, OrderStatus::CancelledByCustomer, h.customer()).await;
    assert_eq!(h.acceptance_rate(), 90.0);

    assert_eq!(h.orchestrator.refresh_acceptance_rate(h.merchant.id).await.unwrap(), 90.0);
}

#[tokio::test]
async fn test_refresh_without_history_keeps_default() {
    let h = harness();
    let rate = h.orchestrator.refresh_acceptance_rate(h.merchant.id).await.unwrap();
    assert_eq!(rate, Merchant::DEFAULT_ACCEPTANCE_RATE);
}

#[tokio::test]
async fn test_dispatch_delivery_and_rating() {
    let h = harness();
    let order_id = h.processing_order().await;
    let agent = Uuid::new_v4();

    let assigned = h
        .orchestrator
        .assign_delivery_agent(order_id, agent, Actor::System)
        .await
        .unwrap();
    assert_eq!(assigned.order.delivery_agent_id, Some(agent));
    assert!(assigned.order.delivery_started_at.is_none());

    h.move_to(order_id, OrderStatus::Completed, h.cooker()).await;
    let started = h
        .orchestrator
        .assign_delivery_agent(order_id, agent, Actor::System)
        .await
        .unwrap();
    assert!(started.order.delivery_started_at.is_some());

    let err = h
        .orchestrator
        .rate_order(order_id, h.customer(), 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Validation(_)));

    let delivered = h.move_to(order_id, OrderStatus::Delivered, Actor::DeliveryAgent(agent)).await;
    assert!(delivered.order.delivered_at.is_some());

    let rated = h
        .orchestrator
        .rate_order(order_id, h.customer(), 4, Some("Still warm".to_string()))
        .await
        .unwrap();
    assert_eq!(rated.order.rating, Some(4));
    assert_eq!(rated.order.comment.as_deref(), Some("Still warm"));

    let again = h.orchestrator.rate_order(order_id, h.customer(), 1, None).await;
    assert!(matches!(again, Err(OrderError::Validation(_))));
}

#[tokio::test]
async fn test_dispatch_requires_system() {
    let h = harness();
    let order_id = h.processing_order().await;

    let err = h
        .orchestrator
        .assign_delivery_agent(order_id, Uuid::new_v4(), h.cooker())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Forbidden(_)));
}

#[tokio::test]
async fn test_dispatch_refused_while_cancellation_pending() {
    let h = harness();
    let order_id = h.processing_order().await;

    h.payments.set_failing(true);
    let err = h
        .orchestrator
        .apply_status_change(order_id, OrderStatus::CancelledByCooker, h.cooker())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::PaymentProvider(_)));

    let err = h
        .orchestrator
        .assign_delivery_agent(order_id, Uuid::new_v4(), Actor::System)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::PersistenceConflict(_)));

    h.payments.set_failing(false);
    let cancelled = h.move_to(order_id, OrderStatus::CancelledByCooker, h.cooker()).await;
    assert_eq!(cancelled.order.status, OrderStatus::CancelledByCooker);
    assert!(cancelled.order.delivery_agent_id.is_none());
    assert_eq!(h.payments.refunds().len(), 1);
}

#[tokio::test]
async fn test_closest_merchants() {
    let h = harness();
    let found = h
        .orchestrator
        .closest_merchants(h.customer_id, h.address_id)
        .await
        .unwrap();
    assert_eq!(found, vec![h.merchant.id]);

    h.geolocation.set_unavailable(true);
    let found = h
        .orchestrator
        .closest_merchants(h.customer_id, h.address_id)
        .await
        .unwrap();
    assert!(found.is_empty());
}
