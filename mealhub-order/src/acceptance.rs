use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Merchant, OrderStatus};

/// A finished order as seen by the reliability window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalOrder {
    pub order_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

/// New acceptance rate for a cooker, written with the order that caused it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReliabilityUpdate {
    pub cooker_id: Uuid,
    pub acceptance_rate: f64,
    pub updated_at: DateTime<Utc>,
}

/// Rolling-window acceptance rate.
///
/// Only orders that end as DELIVERED or CANCELLED_BY_COOKER count. A customer
/// cancellation says nothing about the cooker and is left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptanceRateTracker;

impl AcceptanceRateTracker {
    pub fn new() -> Self {
        Self
    }

    pub fn counts(status: OrderStatus) -> bool {
        matches!(status, OrderStatus::Delivered | OrderStatus::CancelledByCooker)
    }

    /// The last `capacity` counted orders, newest first. `current` is the
    /// order being terminated now and may not be in `history` yet.
    pub fn window(
        &self,
        history: &[TerminalOrder],
        current: Option<&TerminalOrder>,
        capacity: u32,
    ) -> Vec<TerminalOrder> {
        let mut counted: Vec<TerminalOrder> = history
            .iter()
            .filter(|entry| current.map_or(true, |c| c.order_id != entry.order_id))
            .chain(current)
            .filter(|entry| Self::counts(entry.status))
            .cloned()
            .collect();

        counted.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        counted.truncate(capacity as usize);
        counted
    }

    /// Percentage of delivered orders in the window, or None when empty
    pub fn rate(&self, window: &[TerminalOrder]) -> Option<f64> {
        if window.is_empty() {
            return None;
        }
        let delivered = window
            .iter()
            .filter(|entry| entry.status == OrderStatus::Delivered)
            .count();
        Some(delivered as f64 * 100.0 / window.len() as f64)
    }

    /// Rate to store for `merchant`. None leaves the stored rate untouched.
    pub fn recompute(
        &self,
        merchant: &Merchant,
        history: &[TerminalOrder],
        current: Option<&TerminalOrder>,
        at: DateTime<Utc>,
    ) -> Option<ReliabilityUpdate> {
        let window = self.window(history, current, merchant.order_capacity_window);
        let acceptance_rate = self.rate(&window)?;
        Some(ReliabilityUpdate {
            cooker_id: merchant.id,
            acceptance_rate,
            updated_at: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn history(statuses: &[OrderStatus]) -> Vec<TerminalOrder> {
        let start = Utc::now() - Duration::days(1);
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| TerminalOrder {
                order_id: Uuid::new_v4(),
                created_at: start + Duration::minutes(i as i64),
                status: *status,
            })
            .collect()
    }

    #[test]
    fn test_nine_delivered_one_cooker_cancel() {
        let tracker = AcceptanceRateTracker::new();
        let mut statuses = vec![OrderStatus::Delivered; 9];
        statuses.push(OrderStatus::CancelledByCooker);
        let entries = history(&statuses);

        let window = tracker.window(&entries, None, 10);
        assert_eq!(window.len(), 10);
        assert_eq!(tracker.rate(&window), Some(90.0));
    }

    #[test]
    fn test_customer_cancellations_ignored() {
        let tracker = AcceptanceRateTracker::new();
        let entries = history(&[
            OrderStatus::Delivered,
            OrderStatus::CancelledByCustomer,
            OrderStatus::CancelledByCustomer,
            OrderStatus::CancelledByCooker,
        ]);

        let window = tracker.window(&entries, None, 10);
        assert_eq!(window.len(), 2);
        assert_eq!(tracker.rate(&window), Some(50.0));
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let tracker = AcceptanceRateTracker::new();
        // oldest two are cooker cancellations, pushed out by a window of 3
        let entries = history(&[
            OrderStatus::CancelledByCooker,
            OrderStatus::CancelledByCooker,
            OrderStatus::Delivered,
            OrderStatus::Delivered,
            OrderStatus::Delivered,
        ]);

        let window = tracker.window(&entries, None, 3);
        assert_eq!(window.len(), 3);
        assert!(window[0].created_at > window[2].created_at);
        assert_eq!(tracker.rate(&window), Some(100.0));
    }

    #[test]
    fn test_current_order_included_once() {
        let tracker = AcceptanceRateTracker::new();
        let entries = history(&[OrderStatus::Delivered]);
        let mut current = entries[0].clone();
        current.status = OrderStatus::CancelledByCooker;

        let window = tracker.window(&entries, Some(&current), 10);
        assert_eq!(window, vec![current]);
    }

    #[test]
    fn test_empty_window_leaves_rate() {
        let tracker = AcceptanceRateTracker::new();
        let merchant = Merchant::new("Mama Put", "12 Allen Avenue");
        let entries = history(&[OrderStatus::CancelledByCustomer]);

        assert!(tracker.recompute(&merchant, &entries, None, Utc::now()).is_none());
    }

    #[test]
    fn test_recompute_uses_merchant_window() {
        let tracker = AcceptanceRateTracker::new();
        let mut merchant = Merchant::new("Mama Put", "12 Allen Avenue");
        merchant.order_capacity_window = 2;
        let entries = history(&[OrderStatus::Delivered, OrderStatus::Delivered]);
        let current = TerminalOrder {
            order_id: Uuid::new_v4(),
            created_at: Utc::now(),
            status: OrderStatus::CancelledByCooker,
        };

        let update = tracker
            .recompute(&merchant, &entries, Some(&current), Utc::now())
            .unwrap();
        assert_eq!(update.cooker_id, merchant.id);
        assert_eq!(update.acceptance_rate, 50.0);
    }
}
