use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mealhub_catalog::MerchantLocation;
use mealhub_order::repository::{
    AddressDirectory, MerchantRepository, RepositoryError, RepositoryResult,
};
use mealhub_order::{Merchant, ReliabilityUpdate};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend;

/// Cooker reliability state and customer addresses
pub struct PgMerchantRepository {
    pool: PgPool,
    default_capacity_window: u32,
}

impl PgMerchantRepository {
    pub fn new(pool: PgPool, default_capacity_window: u32) -> Self {
        Self { pool, default_capacity_window }
    }
}

#[derive(sqlx::FromRow)]
struct CookerRow {
    id: Uuid,
    name: String,
    address: String,
    acceptance_rate: f64,
    last_acceptance_rate_update_at: Option<DateTime<Utc>>,
    order_capacity_window: Option<i32>,
}

impl CookerRow {
    fn into_merchant(self, default_window: u32) -> Merchant {
        // a non-positive window would make the rate meaningless
        let window = self
            .order_capacity_window
            .and_then(|w| u32::try_from(w).ok())
            .filter(|w| *w > 0)
            .unwrap_or(default_window);

        Merchant {
            id: self.id,
            name: self.name,
            address: self.address,
            acceptance_rate: self.acceptance_rate,
            last_acceptance_rate_update_at: self.last_acceptance_rate_update_at,
            order_capacity_window: window,
        }
    }
}

#[async_trait]
impl MerchantRepository for PgMerchantRepository {
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Merchant>> {
        let row: Option<CookerRow> = sqlx::query_as(
            "SELECT id, name, address, acceptance_rate, last_acceptance_rate_update_at, \
             order_capacity_window FROM cookers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| row.into_merchant(self.default_capacity_window)))
    }

    async fn locations(&self) -> RepositoryResult<Vec<MerchantLocation>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, address FROM cookers")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|(cooker_id, address)| MerchantLocation { cooker_id, address })
            .collect())
    }

    async fn save_reliability(&self, update: &ReliabilityUpdate) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE cookers SET acceptance_rate = $2, last_acceptance_rate_update_at = $3 \
             WHERE id = $1",
        )
        .bind(update.cooker_id)
        .bind(update.acceptance_rate)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(update.cooker_id));
        }
        Ok(())
    }
}

#[async_trait]
impl AddressDirectory for PgMerchantRepository {
    async fn resolve(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> RepositoryResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT address FROM customer_addresses WHERE id = $1 AND customer_id = $2",
        )
        .bind(address_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|(address,)| address))
    }
}
