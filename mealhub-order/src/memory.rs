use async_trait::async_trait;
use mealhub_catalog::MerchantLocation;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::acceptance::{AcceptanceRateTracker, ReliabilityUpdate, TerminalOrder};
use crate::models::{Merchant, Order};
use crate::repository::{
    AddressDirectory, MerchantRepository, OrderRepository, RepositoryError, RepositoryResult,
};

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    merchants: HashMap<Uuid, Merchant>,
    addresses: HashMap<(Uuid, Uuid), String>,
}

/// Process-local store backing all three repositories.
///
/// Commits take one write lock, so the order row and the cooker's rate change
/// together. Used by tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_merchant(&self, merchant: Merchant) {
        self.write().merchants.insert(merchant.id, merchant);
    }

    pub fn add_address(&self, customer_id: Uuid, address: &str) -> Uuid {
        let address_id = Uuid::new_v4();
        self.write()
            .addresses
            .insert((customer_id, address_id), address.to_string());
        address_id
    }

    pub fn get_merchant(&self, id: Uuid) -> Option<Merchant> {
        self.read().merchants.get(&id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.read().orders.len()
    }

    /// Make every write fail with a backend error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> RepositoryResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("simulated write failure".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_reliability(merchant: &mut Merchant, update: &ReliabilityUpdate) {
    merchant.acceptance_rate = update.acceptance_rate;
    merchant.last_acceptance_rate_update_at = Some(update.updated_at);
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order) -> RepositoryResult<()> {
        self.check_writable()?;
        let mut tables = self.write();
        if tables.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(order.id));
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        Ok(self.read().orders.get(&id).cloned())
    }

    async fn find_by_authorization(
        &self,
        authorization_ref: &str,
    ) -> RepositoryResult<Option<Order>> {
        Ok(self
            .read()
            .orders
            .values()
            .find(|order| order.payment_authorization_ref.as_deref() == Some(authorization_ref))
            .cloned())
    }

    async fn commit(
        &self,
        order: &Order,
        reliability: Option<&ReliabilityUpdate>,
    ) -> RepositoryResult<i64> {
        self.check_writable()?;
        let mut tables = self.write();

        let stored_version = tables
            .orders
            .get(&order.id)
            .map(|stored| stored.version)
            .ok_or(RepositoryError::NotFound(order.id))?;
        if stored_version != order.version {
            return Err(RepositoryError::Conflict(order.id));
        }

        // validate both writes before applying either
        if let Some(update) = reliability {
            if !tables.merchants.contains_key(&update.cooker_id) {
                return Err(RepositoryError::NotFound(update.cooker_id));
            }
        }

        let mut stored = order.clone();
        stored.version = order.version + 1;
        tables.orders.insert(stored.id, stored);

        if let Some(update) = reliability {
            if let Some(merchant) = tables.merchants.get_mut(&update.cooker_id) {
                apply_reliability(merchant, update);
            }
        }

        Ok(order.version + 1)
    }

    async fn terminal_history(
        &self,
        cooker_id: Uuid,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> RepositoryResult<Vec<TerminalOrder>> {
        let tables = self.read();
        let mut history: Vec<TerminalOrder> = tables
            .orders
            .values()
            .filter(|order| {
                order.cooker_id == cooker_id && AcceptanceRateTracker::counts(order.status)
            })
            .filter(|order| Some(order.id) != exclude)
            .map(|order| TerminalOrder {
                order_id: order.id,
                created_at: order.created_at,
                status: order.status,
            })
            .collect();

        history.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        history.truncate(limit);
        Ok(history)
    }
}

#[async_trait]
impl MerchantRepository for InMemoryStore {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Merchant>> {
        Ok(self.get_merchant(id))
    }

    async fn locations(&self) -> RepositoryResult<Vec<MerchantLocation>> {
        Ok(self
            .read()
            .merchants
            .values()
            .map(|merchant| MerchantLocation {
                cooker_id: merchant.id,
                address: merchant.address.clone(),
            })
            .collect())
    }

    async fn save_reliability(&self, update: &ReliabilityUpdate) -> RepositoryResult<()> {
        self.check_writable()?;
        let mut tables = self.write();
        let merchant = tables
            .merchants
            .get_mut(&update.cooker_id)
            .ok_or(RepositoryError::NotFound(update.cooker_id))?;
        apply_reliability(merchant, update);
        Ok(())
    }
}

#[async_trait]
impl AddressDirectory for InMemoryStore {
    async fn resolve(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> RepositoryResult<Option<String>> {
        Ok(self.read().addresses.get(&(customer_id, address_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use chrono::Utc;

    fn draft(cooker_id: Uuid) -> Order {
        Order::new(Uuid::new_v4(), cooker_id, Uuid::new_v4(), vec![], None, "eur")
    }

    #[tokio::test]
    async fn test_commit_bumps_version_and_rejects_stale() {
        let store = InMemoryStore::new();
        let order = draft(Uuid::new_v4());
        store.insert(&order).await.unwrap();

        let mut first = order.clone();
        first.status = OrderStatus::Pending;
        assert_eq!(store.commit(&first, None).await.unwrap(), 1);

        // second writer still holds version 0
        let stale = order.clone();
        let err = store.commit(&stale, None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let stored = OrderRepository::get(&store, order.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let order = draft(Uuid::new_v4());
        store.insert(&order).await.unwrap();

        // rate update for a merchant that does not exist
        let update = ReliabilityUpdate {
            cooker_id: order.cooker_id,
            acceptance_rate: 50.0,
            updated_at: Utc::now(),
        };
        let mut changed = order.clone();
        changed.status = OrderStatus::Pending;

        assert!(store.commit(&changed, Some(&update)).await.is_err());
        let stored = OrderRepository::get(&store, order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Draft);
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn test_commit_writes_reliability() {
        let store = InMemoryStore::new();
        let merchant = Merchant::new("Buka Joint", "4 Marina Road");
        store.add_merchant(merchant.clone());
        let order = draft(merchant.id);
        store.insert(&order).await.unwrap();

        let at = Utc::now();
        let update = ReliabilityUpdate {
            cooker_id: merchant.id,
            acceptance_rate: 75.0,
            updated_at: at,
        };
        store.commit(&order, Some(&update)).await.unwrap();

        let stored = store.get_merchant(merchant.id).unwrap();
        assert_eq!(stored.acceptance_rate, 75.0);
        assert_eq!(stored.last_acceptance_rate_update_at, Some(at));
    }

    #[tokio::test]
    async fn test_terminal_history_filters_and_excludes() {
        let store = InMemoryStore::new();
        let cooker = Uuid::new_v4();

        let mut delivered = draft(cooker);
        delivered.status = OrderStatus::Delivered;
        let mut cancelled = draft(cooker);
        cancelled.status = OrderStatus::CancelledByCooker;
        let open = draft(cooker);
        let mut by_customer = draft(cooker);
        by_customer.status = OrderStatus::CancelledByCustomer;
        let mut other_cooker = draft(Uuid::new_v4());
        other_cooker.status = OrderStatus::Delivered;

        for order in [&delivered, &cancelled, &open, &by_customer, &other_cooker] {
            store.insert(order).await.unwrap();
        }

        let history = store.terminal_history(cooker, None, 10).await.unwrap();
        assert_eq!(history.len(), 2);

        let history = store.terminal_history(cooker, Some(delivered.id), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].order_id, cancelled.id);
    }

    #[tokio::test]
    async fn test_find_by_authorization_and_address() {
        let store = InMemoryStore::new();
        let mut order = draft(Uuid::new_v4());
        order.payment_authorization_ref = Some("pi_123".to_string());
        store.insert(&order).await.unwrap();

        let found = store.find_by_authorization("pi_123").await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert!(store.find_by_authorization("pi_404").await.unwrap().is_none());

        let customer = Uuid::new_v4();
        let address_id = store.add_address(customer, "7 Admiralty Way");
        assert_eq!(
            store.resolve(customer, address_id).await.unwrap().as_deref(),
            Some("7 Admiralty Way")
        );
        assert!(store.resolve(Uuid::new_v4(), address_id).await.unwrap().is_none());
    }
}
