use async_trait::async_trait;
use mealhub_shared::MinorUnits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// What an order line points at: a dish or a drink, never both
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Dish(Uuid),
    Drink(Uuid),
}

impl ItemRef {
    pub fn id(&self) -> Uuid {
        match self {
            ItemRef::Dish(id) | ItemRef::Drink(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ItemRef::Dish(_) => "dish",
            ItemRef::Drink(_) => "drink",
        }
    }
}

/// Catalog view of a sellable dish or drink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item: ItemRef,
    pub cooker_id: Uuid,
    pub name: String,
    pub unit_price: MinorUnits,
    pub is_enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog backend error: {0}")]
    Backend(String),
}

/// Read-only access to merchants' dishes and drinks
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, item: ItemRef) -> Result<Option<CatalogEntry>, CatalogError>;
}

/// In-memory catalog for tests and local runs
#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<ItemRef, CatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: CatalogEntry) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(entry.item, entry);
    }

    /// Register an enabled dish and return its reference
    pub fn add_dish(&self, cooker_id: Uuid, name: &str, unit_price: MinorUnits) -> ItemRef {
        let item = ItemRef::Dish(Uuid::new_v4());
        self.insert(CatalogEntry {
            item,
            cooker_id,
            name: name.to_string(),
            unit_price,
            is_enabled: true,
        });
        item
    }

    /// Register an enabled drink and return its reference
    pub fn add_drink(&self, cooker_id: Uuid, name: &str, unit_price: MinorUnits) -> ItemRef {
        let item = ItemRef::Drink(Uuid::new_v4());
        self.insert(CatalogEntry {
            item,
            cooker_id,
            name: name.to_string(),
            unit_price,
            is_enabled: true,
        });
        item
    }

    pub fn set_enabled(&self, item: ItemRef, enabled: bool) {
        if let Some(entry) = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(&item)
        {
            entry.is_enabled = enabled;
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn lookup(&self, item: ItemRef) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&item)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ref_serialization() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ItemRef::Drink(id)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "drink", "id": id}));
    }

    #[tokio::test]
    async fn test_in_memory_lookup_and_disable() {
        let catalog = InMemoryCatalog::new();
        let cooker = Uuid::new_v4();
        let dish = catalog.add_dish(cooker, "Jollof Rice", 1250);

        let entry = catalog.lookup(dish).await.unwrap().unwrap();
        assert_eq!(entry.unit_price, 1250);
        assert!(entry.is_enabled);

        catalog.set_enabled(dish, false);
        assert!(!catalog.lookup(dish).await.unwrap().unwrap().is_enabled);

        // Same id, other kind, is a different item
        assert!(catalog.lookup(ItemRef::Drink(dish.id())).await.unwrap().is_none());
    }
}
