use chrono::{DateTime, Utc};
use mealhub_core::PaymentGateway;
use mealhub_shared::money::format_major;
use std::sync::Arc;
use uuid::Uuid;

use crate::acceptance::{AcceptanceRateTracker, ReliabilityUpdate, TerminalOrder};
use crate::error::{OrderError, OrderResult};
use crate::finance::FinancialManager;
use crate::models::{Order, OrderStatus};
use crate::repository::{MerchantRepository, OrderRepository};

/// Side effects owed by a transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    pub refund: bool,
    pub recompute_acceptance: bool,
}

pub fn effects_for(to: OrderStatus) -> TransitionEffects {
    TransitionEffects {
        refund: matches!(
            to,
            OrderStatus::CancelledByCustomer | OrderStatus::CancelledByCooker
        ),
        recompute_acceptance: matches!(to, OrderStatus::Delivered | OrderStatus::CancelledByCooker),
    }
}

/// Move `order` to `target` in memory, stamping the milestone.
/// Nothing is written on failure.
pub fn apply(order: &mut Order, target: OrderStatus, at: DateTime<Utc>) -> OrderResult<()> {
    if !order.status.can_transition_to(target) {
        return Err(OrderError::InvalidTransition {
            from: Some(order.status),
            to: target,
        });
    }

    order.status = target;
    if let Some(milestone) = target.milestone() {
        order.stamp(milestone, at);
    }
    Ok(())
}

/// Drives validated transitions and their side effects.
///
/// Collaborator calls (refund, history reads) happen before the final commit,
/// so a failed refund leaves the order at its old status with the claim held.
pub struct OrderStateMachine {
    orders: Arc<dyn OrderRepository>,
    merchants: Arc<dyn MerchantRepository>,
    payments: Arc<dyn PaymentGateway>,
    finance: FinancialManager,
    tracker: AcceptanceRateTracker,
}

impl OrderStateMachine {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        merchants: Arc<dyn MerchantRepository>,
        payments: Arc<dyn PaymentGateway>,
        finance: FinancialManager,
    ) -> Self {
        Self {
            orders,
            merchants,
            payments,
            finance,
            tracker: AcceptanceRateTracker::new(),
        }
    }

    /// Load and transition. A missing order reports a transition from nothing.
    pub async fn transition(&self, order_id: Uuid, target: OrderStatus) -> OrderResult<Order> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::InvalidTransition { from: None, to: target })?;
        self.transition_order(order, target).await
    }

    /// Validate, run side effects, commit.
    ///
    /// Refunding transitions are first claimed with a version-checked write
    /// of `pending_status`, so a stale copy fails before any money moves and
    /// no other writer can overtake the claim while the provider is called.
    /// A claimed order accepts only its claimed target; retrying that target
    /// replays the same refund key and finishes the transition.
    pub async fn transition_order(&self, order: Order, target: OrderStatus) -> OrderResult<Order> {
        ensure_claim_allows(&order, target)?;

        let now = Utc::now();
        let from = order.status;
        let mut next = order.clone();
        apply(&mut next, target, now)?;

        let effects = effects_for(target);
        if effects.refund && order.pending_status.is_none() {
            let mut reserved = order;
            reserved.pending_status = Some(target);
            reserved.updated_at = now;
            next.version = self.orders.commit(&reserved, None).await?;
            tracing::debug!("Order {} claimed for {}", reserved.id, target);
        }

        let reliability = if effects.recompute_acceptance {
            self.reliability_after(&next, now).await?
        } else {
            None
        };

        if effects.refund {
            self.refund(&next).await?;
        }

        next.pending_status = None;
        next.updated_at = now;
        next.version = self.orders.commit(&next, reliability.as_ref()).await?;

        tracing::info!(
            "Order {} transitioned {} -> {} (version {})",
            next.id,
            from,
            target,
            next.version
        );
        if let Some(update) = &reliability {
            tracing::info!(
                "Cooker {} acceptance rate now {:.1}",
                update.cooker_id,
                update.acceptance_rate
            );
        }

        Ok(next)
    }

    /// Rate the cooker will have once `order` reaches its terminal status
    async fn reliability_after(
        &self,
        order: &Order,
        at: DateTime<Utc>,
    ) -> OrderResult<Option<ReliabilityUpdate>> {
        let merchant = self
            .merchants
            .get(order.cooker_id)
            .await?
            .ok_or(OrderError::MerchantNotFound(order.cooker_id))?;

        let history = self
            .orders
            .terminal_history(
                order.cooker_id,
                Some(order.id),
                merchant.order_capacity_window as usize,
            )
            .await?;
        let current = TerminalOrder {
            order_id: order.id,
            created_at: order.created_at,
            status: order.status,
        };

        Ok(self.tracker.recompute(&merchant, &history, Some(&current), at))
    }

    async fn refund(&self, order: &Order) -> OrderResult<()> {
        let authorization_ref = order.payment_authorization_ref.as_deref().ok_or_else(|| {
            OrderError::PaymentProvider(format!("order {} has no payment authorization", order.id))
        })?;
        let amount = self.finance.refund_amount(order);
        let refund = self
            .payments
            .refund(authorization_ref, amount, &refund_key(order.id))
            .await?;

        tracing::info!(
            "Refund {} of {} issued for order {}",
            refund.id,
            format_major(refund.amount, &order.currency),
            order.id
        );
        Ok(())
    }

    /// Recompute and store a cooker's rate outside any transition
    pub async fn refresh_acceptance_rate(&self, cooker_id: Uuid) -> OrderResult<f64> {
        let merchant = self
            .merchants
            .get(cooker_id)
            .await?
            .ok_or(OrderError::MerchantNotFound(cooker_id))?;
        let history = self
            .orders
            .terminal_history(cooker_id, None, merchant.order_capacity_window as usize)
            .await?;

        match self.tracker.recompute(&merchant, &history, None, Utc::now()) {
            Some(update) => {
                self.merchants.save_reliability(&update).await?;
                Ok(update.acceptance_rate)
            }
            None => Ok(merchant.acceptance_rate),
        }
    }
}

/// A claimed order only moves to the claimed target
pub fn ensure_claim_allows(order: &Order, target: OrderStatus) -> OrderResult<()> {
    match order.pending_status {
        Some(claimed) if claimed != target => {
            tracing::debug!(
                "Order {} is claimed for {}; refusing {}",
                order.id,
                claimed,
                target
            );
            Err(OrderError::PersistenceConflict(order.id))
        }
        _ => Ok(()),
    }
}

/// Provider idempotency key for an order's cancellation refund
pub fn refund_key(order_id: Uuid) -> String {
    format!("refund:{}", order_id)
}
