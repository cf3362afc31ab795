use mealhub_shared::money::{apply_rate, MinorUnits};
use serde::{Deserialize, Serialize};

use crate::models::Order;

/// Derived amounts for an order; never stored as the source of truth
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: MinorUnits,
    pub service_fee: MinorUnits,
    pub delivery_fee: MinorUnits,
    pub total: MinorUnits,
}

/// Computes what the customer pays and what is returned on cancellation
#[derive(Debug, Clone)]
pub struct FinancialManager {
    service_fee_rate: f64,
}

impl FinancialManager {
    pub fn new(service_fee_rate: f64) -> Self {
        Self { service_fee_rate }
    }

    pub fn service_fee(&self, subtotal: MinorUnits) -> MinorUnits {
        apply_rate(subtotal, self.service_fee_rate)
    }

    /// Recompute totals from the current lines and delivery fee.
    /// The dispatch bonus is never charged to the customer.
    pub fn totals(&self, order: &Order) -> OrderTotals {
        let subtotal = order.subtotal();
        let service_fee = self.service_fee(subtotal);
        let delivery_fee = order.delivery_fee.unwrap_or(0);

        OrderTotals {
            subtotal,
            service_fee,
            delivery_fee,
            total: subtotal.saturating_add(service_fee).saturating_add(delivery_fee),
        }
    }

    /// Amount returned on cancellation: subtotal plus service fee.
    /// The delivery fee covers dispatch already committed and is kept.
    pub fn refund_amount(&self, order: &Order) -> MinorUnits {
        let totals = self.totals(order);
        totals.subtotal.saturating_add(totals.service_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderLine;
    use mealhub_catalog::ItemRef;
    use uuid::Uuid;

    fn order_with(lines: Vec<(u32, MinorUnits)>, delivery_fee: Option<MinorUnits>) -> Order {
        let items = lines
            .into_iter()
            .map(|(quantity, unit_price)| OrderLine {
                item: ItemRef::Dish(Uuid::new_v4()),
                name: "Suya".to_string(),
                quantity,
                unit_price,
            })
            .collect();
        let mut order =
            Order::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), items, None, "eur");
        order.delivery_fee = delivery_fee;
        order
    }

    #[test]
    fn test_totals() {
        let finance = FinancialManager::new(0.10);
        let order = order_with(vec![(2, 1000), (1, 500)], Some(260));

        let totals = finance.totals(&order);
        assert_eq!(
            totals,
            OrderTotals {
                subtotal: 2500,
                service_fee: 250,
                delivery_fee: 260,
                total: 3010,
            }
        );
    }

    #[test]
    fn test_bonus_not_charged() {
        let finance = FinancialManager::new(0.10);
        let mut order = order_with(vec![(1, 1000)], Some(300));
        order.delivery_fee_bonus = Some(150);

        assert_eq!(finance.totals(&order).total, 1000 + 100 + 300);
    }

    #[test]
    fn test_refund_excludes_delivery_fee() {
        let finance = FinancialManager::new(0.10);
        let order = order_with(vec![(3, 700)], Some(1260));

        assert_eq!(finance.refund_amount(&order), 2100 + 210);
    }
}
