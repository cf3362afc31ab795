use chrono::{DateTime, Duration, Utc};
use mealhub_catalog::{Catalog, MerchantLocator, PricingEngine};
use mealhub_core::{GeolocationGateway, PaymentEventKind, PaymentGateway};
use mealhub_shared::money::format_major;
use mealhub_shared::MinorUnits;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::changes::{ChangeHandler, LineRequest};
use crate::error::{OrderError, OrderResult};
use crate::finance::{FinancialManager, OrderTotals};
use crate::models::{Actor, Milestone, Order, OrderStatus};
use crate::repository::{AddressDirectory, MerchantRepository, OrderRepository};
use crate::state_machine::OrderStateMachine;

/// External collaborators, constructed once at start-up
#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderRepository>,
    pub merchants: Arc<dyn MerchantRepository>,
    pub addresses: Arc<dyn AddressDirectory>,
    pub catalog: Arc<dyn Catalog>,
    pub geolocation: Arc<dyn GeolocationGateway>,
    pub payments: Arc<dyn PaymentGateway>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub currency: String,
    /// Scheduled deliveries must be at least this far in the future
    pub min_schedule_lead: Duration,
    pub discovery_radius_km: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            currency: "eur".to_string(),
            min_schedule_lead: Duration::minutes(60),
            discovery_radius_km: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub address_id: Uuid,
    /// Derived from the items when absent
    #[serde(default)]
    pub cooker_id: Option<Uuid>,
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub scheduled_delivery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub address_id: Option<Uuid>,
}

/// The order as returned to callers, with totals computed on read
#[derive(Debug, Clone, Serialize)]
pub struct OrderProjection {
    #[serde(flatten)]
    pub order: Order,
    pub totals: OrderTotals,
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// DRAFT -> PENDING applied by this delivery
    Applied(OrderProjection),
    /// A previous delivery already moved the order on
    AlreadyApplied(OrderProjection),
    /// Verified, but not an event that drives a transition
    Ignored { event_id: String, kind: PaymentEventKind },
}

/// Entry points for the API layer
pub struct OrderOrchestrator {
    collaborators: Collaborators,
    pricing: PricingEngine,
    finance: FinancialManager,
    changes: ChangeHandler,
    state_machine: OrderStateMachine,
    locator: MerchantLocator,
    config: OrchestratorConfig,
}

impl OrderOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        pricing: PricingEngine,
        config: OrchestratorConfig,
    ) -> Self {
        let finance = FinancialManager::new(pricing.config().service_fee_rate);
        let state_machine = OrderStateMachine::new(
            collaborators.orders.clone(),
            collaborators.merchants.clone(),
            collaborators.payments.clone(),
            finance.clone(),
        );

        Self {
            changes: ChangeHandler::new(collaborators.catalog.clone()),
            locator: MerchantLocator::new(collaborators.geolocation.clone()),
            collaborators,
            pricing,
            finance,
            state_machine,
            config,
        }
    }

    pub fn project(&self, order: Order) -> OrderProjection {
        let totals = self.finance.totals(&order);
        OrderProjection { order, totals }
    }

    pub async fn get_order(&self, order_id: Uuid) -> OrderResult<OrderProjection> {
        let order = self.load(order_id).await?;
        Ok(self.project(order))
    }

    /// Create a DRAFT order with an open payment authorization for its total.
    ///
    /// Order of effects: geolocation, pricing, authorization, persist. If the
    /// insert fails the authorization is voided before the error is returned.
    pub async fn create_order(&self, request: CreateOrderRequest) -> OrderResult<OrderProjection> {
        let now = Utc::now();
        validate_schedule(request.scheduled_delivery_at, now, self.config.min_schedule_lead)?;

        let (cooker_id, lines) = self
            .changes
            .price_lines(&request.items, request.cooker_id)
            .await?;
        let merchant = self
            .collaborators
            .merchants
            .get(cooker_id)
            .await?
            .ok_or(OrderError::MerchantNotFound(cooker_id))?;
        let address = self.resolve_address(request.customer_id, request.address_id).await?;

        let distance = self.quote_distance(&merchant.address, &address).await?;
        let delivery_fee = self.pricing.compute_delivery_fee(distance)?;

        let mut order = Order::new(
            request.customer_id,
            cooker_id,
            request.address_id,
            lines,
            request.scheduled_delivery_at,
            &self.config.currency,
        );
        order.delivery_distance_meters = Some(distance);
        order.delivery_fee = Some(delivery_fee);
        let totals = self.finance.totals(&order);

        let authorization = self
            .collaborators
            .payments
            .authorize(totals.total, &self.config.currency, &request.customer_id.to_string())
            .await?;
        order.payment_authorization_ref = Some(authorization.id.clone());
        order.payment_authorization_secret = authorization.client_secret;
        order.authorized_amount = totals.total;

        if let Err(e) = self.collaborators.orders.insert(&order).await {
            tracing::error!("Failed to persist order {}: {}", order.id, e);
            self.release_authorization(&authorization.id).await;
            return Err(e.into());
        }

        tracing::info!(
            "Order {} created for cooker {} (total {}, {} m)",
            order.id,
            cooker_id,
            format_major(totals.total, &order.currency),
            distance
        );
        Ok(OrderProjection { order, totals })
    }

    /// Replace the items of a DRAFT order, and optionally its address.
    /// The open authorization is resized, never replaced.
    pub async fn update_order(
        &self,
        order_id: Uuid,
        actor: Actor,
        request: UpdateOrderRequest,
    ) -> OrderResult<OrderProjection> {
        let mut order = self.load(order_id).await?;
        if actor != Actor::Customer(order.customer_id) {
            return Err(OrderError::Forbidden(format!(
                "{} cannot edit order {}",
                actor, order.id
            )));
        }
        if !ChangeHandler::is_modifiable(&order) {
            return Err(OrderError::NotModifiable {
                id: order.id,
                status: order.status,
            });
        }

        let (_, lines) = self
            .changes
            .price_lines(&request.items, Some(order.cooker_id))
            .await?;
        ChangeHandler::replace_lines(&mut order, lines)?;

        if let Some(address_id) = request.address_id.filter(|id| *id != order.address_id) {
            let merchant = self
                .collaborators
                .merchants
                .get(order.cooker_id)
                .await?
                .ok_or(OrderError::MerchantNotFound(order.cooker_id))?;
            let address = self.resolve_address(order.customer_id, address_id).await?;
            let distance = self.quote_distance(&merchant.address, &address).await?;

            order.delivery_fee = Some(self.pricing.compute_delivery_fee(distance)?);
            order.delivery_distance_meters = Some(distance);
            order.address_id = address_id;
        }

        let totals = self.finance.totals(&order);
        let previous_amount = order.authorized_amount;
        let resized = totals.total != previous_amount;
        if resized {
            let authorization_ref = authorization_of(&order)?;
            self.collaborators
                .payments
                .update_authorization(authorization_ref, totals.total)
                .await?;
            order.authorized_amount = totals.total;
        }

        match self.collaborators.orders.commit(&order, None).await {
            Ok(version) => order.version = version,
            Err(e) => {
                tracing::error!("Failed to persist update of order {}: {}", order.id, e);
                if resized {
                    let authorization_ref = authorization_of(&order)?;
                    self.restore_authorization(authorization_ref, previous_amount).await;
                }
                return Err(e.into());
            }
        }

        tracing::info!("Order {} updated (total {})", order.id, totals.total);
        Ok(OrderProjection { order, totals })
    }

    /// Request a transition on behalf of `actor`
    pub async fn apply_status_change(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: Actor,
    ) -> OrderResult<OrderProjection> {
        let order = self
            .collaborators
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::InvalidTransition { from: None, to: target })?;
        authorize_transition(&order, target, actor)?;

        let order = self.state_machine.transition_order(order, target).await?;
        Ok(self.project(order))
    }

    /// Verified payment confirmation: DRAFT -> PENDING.
    ///
    /// Redeliveries of the same event find the order past DRAFT and change
    /// nothing.
    pub async fn handle_payment_confirmed(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> OrderResult<WebhookOutcome> {
        let event = self
            .collaborators
            .payments
            .verify_webhook_signature(payload, signature)
            .map_err(|e| {
                tracing::warn!("Rejected payment webhook: {}", e);
                OrderError::UntrustedEvent(e.to_string())
            })?;

        if event.kind != PaymentEventKind::Succeeded {
            tracing::info!(
                "Payment event {} ({:?}) acknowledged without transition",
                event.id,
                event.kind
            );
            return Ok(WebhookOutcome::Ignored {
                event_id: event.id,
                kind: event.kind,
            });
        }

        let order = self
            .collaborators
            .orders
            .find_by_authorization(&event.authorization_ref)
            .await?
            .ok_or_else(|| OrderError::UnknownAuthorization(event.authorization_ref.clone()))?;

        if order.status != OrderStatus::Draft {
            tracing::debug!("Payment for order {} already applied", order.id);
            return Ok(WebhookOutcome::AlreadyApplied(self.project(order)));
        }

        if let Some(amount) = event.amount.filter(|amount| *amount != order.authorized_amount) {
            tracing::warn!(
                "Order {} confirmed for {} but {} was authorized",
                order.id,
                amount,
                order.authorized_amount
            );
        }

        let order_id = order.id;
        match self.state_machine.transition_order(order, OrderStatus::Pending).await {
            Ok(order) => Ok(WebhookOutcome::Applied(self.project(order))),
            Err(OrderError::PersistenceConflict(_)) => {
                // a concurrent delivery won the race
                let current = self.load(order_id).await?;
                if current.status == OrderStatus::Draft {
                    return Err(OrderError::PersistenceConflict(order_id));
                }
                Ok(WebhookOutcome::AlreadyApplied(self.project(current)))
            }
            Err(e) => Err(e),
        }
    }

    /// Leave a rating on a delivered order. Set once.
    pub async fn rate_order(
        &self,
        order_id: Uuid,
        actor: Actor,
        rating: u8,
        comment: Option<String>,
    ) -> OrderResult<OrderProjection> {
        let mut order = self.load(order_id).await?;
        if actor != Actor::Customer(order.customer_id) {
            return Err(OrderError::Forbidden(format!("{} cannot rate order {}", actor, order.id)));
        }
        if order.status != OrderStatus::Delivered {
            return Err(OrderError::Validation(format!(
                "order {} can only be rated once delivered (status {})",
                order.id, order.status
            )));
        }
        if order.rating.is_some() {
            return Err(OrderError::Validation(format!("order {} is already rated", order.id)));
        }
        if !(1..=5).contains(&rating) {
            return Err(OrderError::Validation(format!("rating must be 1 to 5, got {}", rating)));
        }

        order.rating = Some(rating);
        order.comment = comment.filter(|c| !c.trim().is_empty());
        order.updated_at = Utc::now();
        order.version = self.collaborators.orders.commit(&order, None).await?;
        Ok(self.project(order))
    }

    /// Dispatch hook. Does not change status; the first assignment on a
    /// COMPLETED order marks the start of delivery.
    pub async fn assign_delivery_agent(
        &self,
        order_id: Uuid,
        agent_id: Uuid,
        actor: Actor,
    ) -> OrderResult<OrderProjection> {
        if actor != Actor::System {
            return Err(OrderError::Forbidden(format!("{} cannot dispatch orders", actor)));
        }

        let mut order = self.load(order_id).await?;
        if order.pending_status.is_some() {
            return Err(OrderError::PersistenceConflict(order.id));
        }
        if !matches!(order.status, OrderStatus::Processing | OrderStatus::Completed) {
            return Err(OrderError::Validation(format!(
                "order {} cannot be dispatched in status {}",
                order.id, order.status
            )));
        }

        let now = Utc::now();
        order.delivery_agent_id = Some(agent_id);
        order.updated_at = now;
        if order.status == OrderStatus::Completed {
            order.stamp(Milestone::DeliveryStarted, now);
        }

        order.version = self.collaborators.orders.commit(&order, None).await?;
        tracing::info!("Delivery agent {} assigned to order {}", agent_id, order.id);
        Ok(self.project(order))
    }

    pub async fn refresh_acceptance_rate(&self, cooker_id: Uuid) -> OrderResult<f64> {
        self.state_machine.refresh_acceptance_rate(cooker_id).await
    }

    /// Merchants that can deliver to one of the customer's addresses, nearest
    /// first. Provider outages yield an empty list.
    pub async fn closest_merchants(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> OrderResult<Vec<Uuid>> {
        let address = self.resolve_address(customer_id, address_id).await?;
        let candidates = self.collaborators.merchants.locations().await?;
        Ok(self
            .locator
            .closest_merchants(&address, &candidates, self.config.discovery_radius_km)
            .await)
    }

    async fn load(&self, order_id: Uuid) -> OrderResult<Order> {
        self.collaborators
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn resolve_address(&self, customer_id: Uuid, address_id: Uuid) -> OrderResult<String> {
        self.collaborators
            .addresses
            .resolve(customer_id, address_id)
            .await?
            .ok_or_else(|| {
                OrderError::Validation(format!("unknown address {} for customer", address_id))
            })
    }

    /// Travel distance from the cooker to the customer.
    /// A provider failure is fatal here since no fee can be computed.
    async fn quote_distance(&self, origin: &str, destination: &str) -> OrderResult<i64> {
        let elements = self
            .collaborators
            .geolocation
            .distance(origin, &[destination.to_string()])
            .await?;

        let element = elements.first().ok_or_else(|| {
            OrderError::GeolocationUnavailable("provider returned no elements".to_string())
        })?;
        let meters = element.meters().ok_or_else(|| {
            OrderError::Validation(format!("no route to delivery address ({:?})", element.status))
        })?;

        i64::try_from(meters).map_err(|_| OrderError::InvalidDistance(meters.to_string()))
    }

    /// Put the hold back to what the stored order still says
    async fn restore_authorization(&self, authorization_ref: &str, amount: MinorUnits) {
        match self
            .collaborators
            .payments
            .update_authorization(authorization_ref, amount)
            .await
        {
            Ok(()) => tracing::info!(
                "Restored authorization {} to {}",
                authorization_ref,
                amount
            ),
            Err(e) => tracing::warn!(
                "Failed to restore authorization {} to {}: {}",
                authorization_ref,
                amount,
                e
            ),
        }
    }

    async fn release_authorization(&self, authorization_ref: &str) {
        match self.collaborators.payments.void_authorization(authorization_ref).await {
            Ok(()) => tracing::info!("Voided orphaned authorization {}", authorization_ref),
            Err(e) => tracing::warn!(
                "Failed to void authorization {}; it will expire at the provider: {}",
                authorization_ref,
                e
            ),
        }
    }
}

fn authorization_of(order: &Order) -> OrderResult<&str> {
    order.payment_authorization_ref.as_deref().ok_or_else(|| {
        OrderError::PaymentProvider(format!("order {} has no payment authorization", order.id))
    })
}

/// Fails when a requested delivery time is in the past or too soon
pub fn validate_schedule(
    scheduled: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    min_lead: Duration,
) -> OrderResult<()> {
    let Some(at) = scheduled else {
        return Ok(());
    };

    if at <= now {
        return Err(OrderError::InvalidSchedule(format!("{} is in the past", at)));
    }
    if at - now < min_lead {
        return Err(OrderError::InvalidSchedule(format!(
            "{} is less than {} minutes away",
            at,
            min_lead.num_minutes()
        )));
    }
    Ok(())
}

/// Which actor may request which target on this order
pub fn authorize_transition(order: &Order, target: OrderStatus, actor: Actor) -> OrderResult<()> {
    let allowed = match target {
        OrderStatus::Draft | OrderStatus::Pending => false,
        OrderStatus::Processing | OrderStatus::Completed | OrderStatus::CancelledByCooker => {
            actor == Actor::Cooker(order.cooker_id)
        }
        OrderStatus::CancelledByCustomer => actor == Actor::Customer(order.customer_id),
        OrderStatus::Delivered => match actor {
            Actor::System => true,
            Actor::DeliveryAgent(id) => order.delivery_agent_id == Some(id),
            _ => false,
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(OrderError::Forbidden(format!(
            "{} may not move order {} to {}",
            actor, order.id, target
        )))
    }
}
