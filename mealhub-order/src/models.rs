use chrono::{DateTime, Utc};
use mealhub_catalog::ItemRef;
use mealhub_shared::{Masked, MinorUnits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Pending,
    Processing,
    Completed,
    Delivered,
    CancelledByCustomer,
    CancelledByCooker,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Draft,
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Delivered,
        OrderStatus::CancelledByCustomer,
        OrderStatus::CancelledByCooker,
    ];

    /// The transition table. Terminal statuses have no targets.
    pub fn allowed_targets(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Draft => &[Pending],
            Pending => &[Processing, CancelledByCustomer, CancelledByCooker],
            Processing => &[Completed, CancelledByCustomer, CancelledByCooker],
            Completed => &[Delivered, CancelledByCustomer],
            Delivered | CancelledByCustomer | CancelledByCooker => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Timestamp written by the transition that reaches this status
    pub fn milestone(self) -> Option<Milestone> {
        match self {
            OrderStatus::Draft => None,
            OrderStatus::Pending => Some(Milestone::Paid),
            OrderStatus::Processing => Some(Milestone::Processing),
            OrderStatus::Completed => Some(Milestone::Completed),
            OrderStatus::Delivered => Some(Milestone::Delivered),
            OrderStatus::CancelledByCustomer | OrderStatus::CancelledByCooker => {
                Some(Milestone::Cancelled)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::CancelledByCustomer => "CANCELLED_BY_CUSTOMER",
            OrderStatus::CancelledByCooker => "CANCELLED_BY_COOKER",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// Lifecycle timestamps on the order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Paid,
    Processing,
    Completed,
    DeliveryStarted,
    Delivered,
    Cancelled,
}

/// Who is asking for a change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(Uuid),
    Cooker(Uuid),
    DeliveryAgent(Uuid),
    /// Internal callers such as dispatch
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer {}", id),
            Actor::Cooker(id) => write!(f, "cooker {}", id),
            Actor::DeliveryAgent(id) => write!(f, "delivery agent {}", id),
            Actor::System => write!(f, "system"),
        }
    }
}

/// One dish or drink in an order, priced from the catalog when added
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub item: ItemRef,
    pub name: String,
    pub quantity: u32,
    pub unit_price: MinorUnits,
}

impl OrderLine {
    pub fn line_total(&self) -> MinorUnits {
        self.unit_price.saturating_mul(MinorUnits::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderLine>,
    pub customer_id: Uuid,
    pub cooker_id: Uuid,
    pub address_id: Uuid,
    pub delivery_agent_id: Option<Uuid>,
    pub scheduled_delivery_at: Option<DateTime<Utc>>,
    pub delivery_distance_meters: Option<i64>,
    pub delivery_fee: Option<MinorUnits>,
    pub delivery_fee_bonus: Option<MinorUnits>,
    pub currency: String,
    /// Total at the last successful authorize/update, for reconciliation
    pub authorized_amount: MinorUnits,
    pub payment_authorization_ref: Option<String>,
    pub payment_authorization_secret: Option<Masked<String>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub delivery_started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    /// A refunding transition reserved before the provider was called.
    /// While set, only that transition may be committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_status: Option<OrderStatus>,
    /// Optimistic concurrency token, bumped on every commit
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        customer_id: Uuid,
        cooker_id: Uuid,
        address_id: Uuid,
        items: Vec<OrderLine>,
        scheduled_delivery_at: Option<DateTime<Utc>>,
        currency: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Draft,
            items,
            customer_id,
            cooker_id,
            address_id,
            delivery_agent_id: None,
            scheduled_delivery_at,
            delivery_distance_meters: None,
            delivery_fee: None,
            delivery_fee_bonus: None,
            currency: currency.to_string(),
            authorized_amount: 0,
            payment_authorization_ref: None,
            payment_authorization_secret: None,
            paid_at: None,
            processing_at: None,
            completed_at: None,
            delivery_started_at: None,
            delivered_at: None,
            cancelled_at: None,
            rating: None,
            comment: None,
            pending_status: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of line totals
    pub fn subtotal(&self) -> MinorUnits {
        self.items
            .iter()
            .map(OrderLine::line_total)
            .fold(0, MinorUnits::saturating_add)
    }

    /// "As soon as possible" when no delivery time was requested
    pub fn is_asap(&self) -> bool {
        self.scheduled_delivery_at.is_none()
    }

    pub fn milestone_at(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::Paid => self.paid_at,
            Milestone::Processing => self.processing_at,
            Milestone::Completed => self.completed_at,
            Milestone::DeliveryStarted => self.delivery_started_at,
            Milestone::Delivered => self.delivered_at,
            Milestone::Cancelled => self.cancelled_at,
        }
    }

    /// Record a milestone. A timestamp already set is never overwritten.
    pub fn stamp(&mut self, milestone: Milestone, at: DateTime<Utc>) {
        let slot = match milestone {
            Milestone::Paid => &mut self.paid_at,
            Milestone::Processing => &mut self.processing_at,
            Milestone::Completed => &mut self.completed_at,
            Milestone::DeliveryStarted => &mut self.delivery_started_at,
            Milestone::Delivered => &mut self.delivered_at,
            Milestone::Cancelled => &mut self.cancelled_at,
        };
        if slot.is_none() {
            *slot = Some(at);
        }
        self.updated_at = at;
    }
}

/// Reliability-relevant slice of a cooker record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub acceptance_rate: f64,
    pub last_acceptance_rate_update_at: Option<DateTime<Utc>>,
    /// Rolling window size for the acceptance rate
    pub order_capacity_window: u32,
}

impl Merchant {
    pub const DEFAULT_ACCEPTANCE_RATE: f64 = 100.0;
    pub const DEFAULT_CAPACITY_WINDOW: u32 = 10;

    pub fn new(name: &str, address: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: address.to_string(),
            acceptance_rate: Self::DEFAULT_ACCEPTANCE_RATE,
            last_acceptance_rate_update_at: None,
            order_capacity_window: Self::DEFAULT_CAPACITY_WINDOW,
        }
    }
}
