use mealhub_catalog::{Catalog, ItemRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::{Order, OrderLine, OrderStatus};

/// Largest quantity accepted on a single line
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// A requested line: exactly one of `dish_id` / `drink_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub dish_id: Option<Uuid>,
    pub drink_id: Option<Uuid>,
    pub quantity: u32,
}

impl LineRequest {
    pub fn dish(id: Uuid, quantity: u32) -> Self {
        Self { dish_id: Some(id), drink_id: None, quantity }
    }

    pub fn drink(id: Uuid, quantity: u32) -> Self {
        Self { dish_id: None, drink_id: Some(id), quantity }
    }

    pub fn for_item(item: ItemRef, quantity: u32) -> Self {
        match item {
            ItemRef::Dish(id) => Self::dish(id, quantity),
            ItemRef::Drink(id) => Self::drink(id, quantity),
        }
    }

    pub fn item_ref(&self) -> OrderResult<ItemRef> {
        match (self.dish_id, self.drink_id) {
            (Some(id), None) => Ok(ItemRef::Dish(id)),
            (None, Some(id)) => Ok(ItemRef::Drink(id)),
            (Some(_), Some(_)) => Err(OrderError::Validation(
                "a line references either a dish or a drink, not both".to_string(),
            )),
            (None, None) => Err(OrderError::Validation(
                "a line must reference a dish or a drink".to_string(),
            )),
        }
    }
}

/// Validates and prices requested lines, and applies them to draft orders
pub struct ChangeHandler {
    catalog: Arc<dyn Catalog>,
}

impl ChangeHandler {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Resolve every line against the catalog.
    ///
    /// All items must exist, be enabled and belong to one cooker; when
    /// `cooker_id` is given it must be that cooker. Returns the cooker and the
    /// priced lines.
    pub async fn price_lines(
        &self,
        requested: &[LineRequest],
        cooker_id: Option<Uuid>,
    ) -> OrderResult<(Uuid, Vec<OrderLine>)> {
        if requested.is_empty() {
            return Err(OrderError::Validation(
                "an order needs at least one item".to_string(),
            ));
        }

        let mut owner = cooker_id;
        let mut lines = Vec::with_capacity(requested.len());

        for line in requested {
            let item = line.item_ref()?;
            if line.quantity == 0 || line.quantity > MAX_LINE_QUANTITY {
                return Err(OrderError::Validation(format!(
                    "quantity for {} {} must be between 1 and {}",
                    item.kind(),
                    item.id(),
                    MAX_LINE_QUANTITY
                )));
            }

            let entry = self.catalog.lookup(item).await?.ok_or_else(|| {
                OrderError::Validation(format!("unknown {} {}", item.kind(), item.id()))
            })?;

            if !entry.is_enabled {
                return Err(OrderError::Validation(format!(
                    "{} {} is not available",
                    item.kind(),
                    item.id()
                )));
            }

            match owner {
                Some(expected) if expected != entry.cooker_id => {
                    return Err(OrderError::Validation(format!(
                        "{} {} is not sold by cooker {}",
                        item.kind(),
                        item.id(),
                        expected
                    )));
                }
                Some(_) => {}
                None => owner = Some(entry.cooker_id),
            }

            lines.push(OrderLine {
                item,
                name: entry.name,
                quantity: line.quantity,
                unit_price: entry.unit_price,
            });
        }

        // `requested` is non-empty, so an owner was found or given
        let owner = owner.ok_or_else(|| OrderError::Validation("no cooker for order".to_string()))?;
        Ok((owner, lines))
    }

    /// Swap the order's lines. Only drafts can be edited.
    pub fn replace_lines(order: &mut Order, lines: Vec<OrderLine>) -> OrderResult<()> {
        if !Self::is_modifiable(order) {
            return Err(OrderError::NotModifiable {
                id: order.id,
                status: order.status,
            });
        }
        if lines.is_empty() {
            return Err(OrderError::Validation(
                "an order needs at least one item".to_string(),
            ));
        }

        order.items = lines;
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn is_modifiable(order: &Order) -> bool {
        order.status == OrderStatus::Draft
    }
}
