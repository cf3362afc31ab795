use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mealhub_catalog::ItemRef;
use mealhub_order::repository::{OrderRepository, RepositoryError, RepositoryResult};
use mealhub_order::{Order, OrderLine, OrderStatus, ReliabilityUpdate, TerminalOrder};
use mealhub_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::backend;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str = "id, status, customer_id, cooker_id, address_id, delivery_agent_id, \
    scheduled_delivery_at, delivery_distance_meters, delivery_fee, delivery_fee_bonus, currency, \
    authorized_amount, payment_authorization_ref, payment_authorization_secret, paid_at, \
    processing_at, completed_at, delivery_started_at, delivered_at, cancelled_at, rating, \
    comment, pending_status, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    status: String,
    customer_id: Uuid,
    cooker_id: Uuid,
    address_id: Uuid,
    delivery_agent_id: Option<Uuid>,
    scheduled_delivery_at: Option<DateTime<Utc>>,
    delivery_distance_meters: Option<i64>,
    delivery_fee: Option<i64>,
    delivery_fee_bonus: Option<i64>,
    currency: String,
    authorized_amount: i64,
    payment_authorization_ref: Option<String>,
    payment_authorization_secret: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    processing_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    delivery_started_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    rating: Option<i16>,
    comment: Option<String>,
    pending_status: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LineRow {
    dish_id: Option<Uuid>,
    drink_id: Option<Uuid>,
    name: String,
    quantity: i32,
    unit_price: i64,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    status: String,
}

fn parse_status(raw: &str) -> RepositoryResult<OrderStatus> {
    raw.parse().map_err(RepositoryError::Backend)
}

impl LineRow {
    fn into_line(self) -> RepositoryResult<OrderLine> {
        let item = match (self.dish_id, self.drink_id) {
            (Some(id), None) => ItemRef::Dish(id),
            (None, Some(id)) => ItemRef::Drink(id),
            _ => {
                return Err(RepositoryError::Backend(
                    "order line must reference exactly one of dish or drink".to_string(),
                ))
            }
        };
        let quantity = u32::try_from(self.quantity)
            .map_err(|_| RepositoryError::Backend(format!("invalid quantity {}", self.quantity)))?;

        Ok(OrderLine {
            item,
            name: self.name,
            quantity,
            unit_price: self.unit_price,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderLine>) -> RepositoryResult<Order> {
        let rating = self
            .rating
            .map(|r| {
                u8::try_from(r)
                    .map_err(|_| RepositoryError::Backend(format!("invalid rating {}", r)))
            })
            .transpose()?;
        let pending_status = self.pending_status.as_deref().map(parse_status).transpose()?;

        Ok(Order {
            id: self.id,
            status: parse_status(&self.status)?,
            items,
            customer_id: self.customer_id,
            cooker_id: self.cooker_id,
            address_id: self.address_id,
            delivery_agent_id: self.delivery_agent_id,
            scheduled_delivery_at: self.scheduled_delivery_at,
            delivery_distance_meters: self.delivery_distance_meters,
            delivery_fee: self.delivery_fee,
            delivery_fee_bonus: self.delivery_fee_bonus,
            currency: self.currency,
            authorized_amount: self.authorized_amount,
            payment_authorization_ref: self.payment_authorization_ref,
            payment_authorization_secret: self.payment_authorization_secret.map(Masked::new),
            paid_at: self.paid_at,
            processing_at: self.processing_at,
            completed_at: self.completed_at,
            delivery_started_at: self.delivery_started_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            rating,
            comment: self.comment,
            pending_status,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn split_item(item: ItemRef) -> (Option<Uuid>, Option<Uuid>) {
    match item {
        ItemRef::Dish(id) => (Some(id), None),
        ItemRef::Drink(id) => (None, Some(id)),
    }
}

impl PgOrderRepository {
    async fn load_lines(&self, order_id: Uuid) -> RepositoryResult<Vec<OrderLine>> {
        let rows: Vec<LineRow> = sqlx::query_as(
            "SELECT dish_id, drink_id, name, quantity, unit_price FROM order_lines \
             WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(LineRow::into_line).collect()
    }

    async fn hydrate(&self, row: Option<OrderRow>) -> RepositoryResult<Option<Order>> {
        match row {
            Some(row) => {
                let items = self.load_lines(row.id).await?;
                row.into_order(items).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn write_lines(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut **tx)
            .await
            .map_err(backend)?;

        for (position, line) in order.items.iter().enumerate() {
            let (dish_id, drink_id) = split_item(line.item);
            sqlx::query(
                "INSERT INTO order_lines \
                 (order_id, position, dish_id, drink_id, name, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id)
            .bind(position as i32)
            .bind(dish_id)
            .bind(drink_id)
            .bind(&line.name)
            .bind(line.quantity as i32)
            .bind(line.unit_price)
            .execute(&mut **tx)
            .await
            .map_err(backend)?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, status, customer_id, cooker_id, address_id, delivery_agent_id,
                scheduled_delivery_at, delivery_distance_meters, delivery_fee, delivery_fee_bonus,
                currency, authorized_amount, payment_authorization_ref,
                payment_authorization_secret,
                version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.customer_id)
        .bind(order.cooker_id)
        .bind(order.address_id)
        .bind(order.delivery_agent_id)
        .bind(order.scheduled_delivery_at)
        .bind(order.delivery_distance_meters)
        .bind(order.delivery_fee)
        .bind(order.delivery_fee_bonus)
        .bind(&order.currency)
        .bind(order.authorized_amount)
        .bind(order.payment_authorization_ref.as_deref())
        .bind(order.payment_authorization_secret.as_ref().map(|s| s.expose().as_str()))
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        Self::write_lines(&mut tx, order).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        self.hydrate(row).await
    }

    async fn find_by_authorization(
        &self,
        authorization_ref: &str,
    ) -> RepositoryResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE payment_authorization_ref = $1",
            ORDER_COLUMNS
        ))
        .bind(authorization_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        self.hydrate(row).await
    }

    async fn commit(
        &self,
        order: &Order,
        reliability: Option<&ReliabilityUpdate>,
    ) -> RepositoryResult<i64> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $3, address_id = $4, delivery_agent_id = $5,
                delivery_distance_meters = $6, delivery_fee = $7, delivery_fee_bonus = $8,
                authorized_amount = $9, payment_authorization_ref = $10,
                payment_authorization_secret = $11, paid_at = $12, processing_at = $13,
                completed_at = $14, delivery_started_at = $15, delivered_at = $16,
                cancelled_at = $17, rating = $18, comment = $19, updated_at = $20,
                pending_status = $21, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id)
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.address_id)
        .bind(order.delivery_agent_id)
        .bind(order.delivery_distance_meters)
        .bind(order.delivery_fee)
        .bind(order.delivery_fee_bonus)
        .bind(order.authorized_amount)
        .bind(order.payment_authorization_ref.as_deref())
        .bind(order.payment_authorization_secret.as_ref().map(|s| s.expose().as_str()))
        .bind(order.paid_at)
        .bind(order.processing_at)
        .bind(order.completed_at)
        .bind(order.delivery_started_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(order.rating.map(i16::from))
        .bind(order.comment.as_deref())
        .bind(order.updated_at)
        .bind(order.pending_status.map(|s| s.as_str()))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
            return Err(match exists {
                Some(_) => RepositoryError::Conflict(order.id),
                None => RepositoryError::NotFound(order.id),
            });
        }

        // lines only change while the order is a draft
        if order.status == OrderStatus::Draft {
            Self::write_lines(&mut tx, order).await?;
        }

        if let Some(update) = reliability {
            let updated = sqlx::query(
                "UPDATE cookers SET acceptance_rate = $2, last_acceptance_rate_update_at = $3 \
                 WHERE id = $1",
            )
            .bind(update.cooker_id)
            .bind(update.acceptance_rate)
            .bind(update.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            if updated.rows_affected() == 0 {
                return Err(RepositoryError::NotFound(update.cooker_id));
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(order.version + 1)
    }

    async fn terminal_history(
        &self,
        cooker_id: Uuid,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> RepositoryResult<Vec<TerminalOrder>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, status FROM orders
            WHERE cooker_id = $1
              AND status IN ('DELIVERED', 'CANCELLED_BY_COOKER')
              AND ($2::uuid IS NULL OR id <> $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(cooker_id)
        .bind(exclude)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(TerminalOrder {
                    order_id: row.id,
                    created_at: row.created_at,
                    status: parse_status(&row.status)?,
                })
            })
            .collect()
    }
}
