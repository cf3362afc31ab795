use async_trait::async_trait;
use mealhub_catalog::MerchantLocation;
use uuid::Uuid;

use crate::acceptance::{ReliabilityUpdate, TerminalOrder};
use crate::models::{Merchant, Order};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Version conflict on {0}")]
    Conflict(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable order storage with optimistic concurrency
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> RepositoryResult<()>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Order>>;

    async fn find_by_authorization(
        &self,
        authorization_ref: &str,
    ) -> RepositoryResult<Option<Order>>;

    /// Persist `order` if the stored version still equals `order.version`.
    ///
    /// When `reliability` is given, the cooker's acceptance rate is written in
    /// the same unit of work; either both land or neither does. Returns the new
    /// version.
    async fn commit(
        &self,
        order: &Order,
        reliability: Option<&ReliabilityUpdate>,
    ) -> RepositoryResult<i64>;

    /// A cooker's most recent orders that count toward its acceptance rate
    /// (DELIVERED or CANCELLED_BY_COOKER), newest first. `exclude` drops one
    /// order id from the result.
    async fn terminal_history(
        &self,
        cooker_id: Uuid,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> RepositoryResult<Vec<TerminalOrder>>;
}

#[async_trait]
pub trait MerchantRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Merchant>>;

    /// Addresses of every merchant, for discovery
    async fn locations(&self) -> RepositoryResult<Vec<MerchantLocation>>;

    /// Standalone reliability write, outside any order commit
    async fn save_reliability(&self, update: &ReliabilityUpdate) -> RepositoryResult<()>;
}

/// Resolves a customer's saved delivery address to a routable string
#[async_trait]
pub trait AddressDirectory: Send + Sync {
    async fn resolve(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> RepositoryResult<Option<String>>;
}
