use async_trait::async_trait;
use mealhub_catalog::{Catalog, CatalogEntry, CatalogError, ItemRef};
use sqlx::PgPool;
use uuid::Uuid;

/// Dishes and drinks read from their own tables
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    cooker_id: Uuid,
    name: String,
    unit_price: i64,
    is_enabled: bool,
}

fn lookup_sql(item: ItemRef) -> &'static str {
    match item {
        ItemRef::Dish(_) => {
            "SELECT cooker_id, name, unit_price, is_enabled FROM dishes WHERE id = $1"
        }
        ItemRef::Drink(_) => {
            "SELECT cooker_id, name, unit_price, is_enabled FROM drinks WHERE id = $1"
        }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn lookup(&self, item: ItemRef) -> Result<Option<CatalogEntry>, CatalogError> {
        let row: Option<ItemRow> = sqlx::query_as(lookup_sql(item))
            .bind(item.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::Backend(e.to_string()))?;

        Ok(row.map(|row| CatalogEntry {
            item,
            cooker_id: row.cooker_id,
            name: row.name,
            unit_price: row.unit_price,
            is_enabled: row.is_enabled,
        }))
    }
}
