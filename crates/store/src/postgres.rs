use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{
    Discount, Load, Money, NewOrder, Order, OrderError, OrderItem, OrderRepository,
    OrderStatistics, OrderStatus, OrderTotals, ProductCatalog, ProductSnapshot, ProductStock,
    RepositoryError, TimeRange, UserDirectory, UserSummary,
};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::{Result, StoreError};

const ORDER_COLUMNS: &str = "id, user_id, products_price_cents, products_discount_price_cents, \
     shipping_price_cents, tax_price_cents, status, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Stock reservation is a single conditional `UPDATE`, so the row lock taken
/// by PostgreSQL serializes concurrent checkouts of the same product.
/// Checkout and cancellation run their stock and order writes in one
/// transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::corrupt("orders", e.to_string()))?;

        let totals = OrderTotals::new(
            Money::from_cents(row.try_get("products_price_cents")?),
            Money::from_cents(row.try_get("products_discount_price_cents")?),
            Money::from_cents(row.try_get("shipping_price_cents")?),
            Money::from_cents(row.try_get("tax_price_cents")?),
        );

        Ok(Order::restore(
            OrderId::new(row.try_get("id")?),
            UserId::new(row.try_get("user_id")?),
            totals,
            status,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }

    fn row_to_item(row: &PgRow) -> Result<(OrderId, OrderItem)> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::corrupt("order_items", format!("quantity {quantity}")))?;
        let discount = discount_from_column("order_items", row.try_get("discount")?)?;

        Ok((
            OrderId::new(row.try_get("order_id")?),
            OrderItem {
                product_id: ProductId::new(row.try_get("product_id")?),
                product_name: row.try_get("product_name")?,
                quantity,
                unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                discount,
            },
        ))
    }

    /// Loads the items of many orders in one query.
    async fn load_items(&self, order_ids: &[i64]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, quantity, unit_price_cents, discount
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, product_id
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let (order_id, item) = Self::row_to_item(row)?;
            items.entry(order_id).or_default().push(item);
        }
        Ok(items)
    }

    /// Converts order rows and, when requested, attaches their items.
    async fn hydrate(&self, rows: Vec<PgRow>, load: Load) -> Result<Vec<Order>> {
        let orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;

        if load == Load::Bare || orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id().as_i64()).collect();
        let mut items = self.load_items(&ids).await?;
        Ok(orders
            .into_iter()
            .map(|order| {
                let order_items = items.remove(&order.id()).unwrap_or_default();
                order.with_items(order_items)
            })
            .collect())
    }

    /// Reserves every item and inserts the order in one transaction.
    async fn place_order(&self, order: NewOrder) -> std::result::Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Lock product rows in id order so concurrent checkouts cannot deadlock.
        let mut lines: Vec<(ProductId, u32)> = order
            .items
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        lines.sort_unstable();

        for (product_id, quantity) in lines {
            if !reserve_in(&mut tx, product_id, quantity).await? {
                // Dropping the transaction rolls back earlier reservations.
                tracing::debug!(%product_id, quantity, "stock short, rolling back");
                return Err(RepositoryError::InsufficientStock {
                    product_id,
                    requested: quantity,
                });
            }
        }

        let order = insert_order_in(&mut tx, order).await?;
        tx.commit().await.map_err(StoreError::from)?;
        Ok(order)
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        at: DateTime<Utc>,
    ) -> std::result::Result<Order, RepositoryError> {
        check_edge(id, expected, OrderStatus::Cancelled)?;
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let updated = set_status_in(&mut tx, id, expected, OrderStatus::Cancelled, at).await?;

        if expected.holds_reservation() {
            let rows = sqlx::query(
                r#"
                SELECT product_id, quantity
                FROM order_items
                WHERE order_id = $1
                ORDER BY product_id
                "#,
            )
            .bind(id.as_i64())
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::from)?;

            for row in &rows {
                let product_id: i64 = row.try_get("product_id").map_err(StoreError::from)?;
                let product_id = ProductId::new(product_id);
                let quantity: i32 = row.try_get("quantity").map_err(StoreError::from)?;
                let quantity = u32::try_from(quantity).map_err(|_| {
                    StoreError::corrupt("order_items", format!("quantity {quantity}"))
                })?;
                if !restock_in(&mut tx, product_id, quantity).await? {
                    tracing::warn!(order_id = %id, %product_id, "cannot restock missing product");
                    return Err(RepositoryError::ProductNotFound(product_id));
                }
            }
            tracing::debug!(order_id = %id, lines = rows.len(), "order items restocked");
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(updated)
    }
}

/// Rejects edges outside the lifecycle before anything is written.
fn check_edge(
    id: OrderId,
    expected: OrderStatus,
    next: OrderStatus,
) -> std::result::Result<(), RepositoryError> {
    if expected.can_transition_to(next) {
        Ok(())
    } else {
        Err(RepositoryError::backend(OrderError::InvalidTransition {
            order_id: id,
            from: expected,
            to: next,
        }))
    }
}

/// Conditional decrement; `false` when stock is short or the product is missing.
async fn reserve_in(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: u32,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET total_quantities = total_quantities - $2
        WHERE id = $1 AND total_quantities >= $2
        "#,
    )
    .bind(product_id.as_i64())
    .bind(i64::from(quantity))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns stock to a product; `false` when the product is missing.
async fn restock_in(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: u32,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE products SET total_quantities = total_quantities + $2 WHERE id = $1")
            .bind(product_id.as_i64())
            .bind(i64::from(quantity))
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected() == 1)
}

async fn insert_order_in(conn: &mut PgConnection, order: NewOrder) -> Result<Order> {
    let totals = order.totals;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO orders (user_id, products_price_cents, products_discount_price_cents,
                            shipping_price_cents, tax_price_cents, total_price_cents,
                            status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
        RETURNING id
        "#,
    )
    .bind(order.user_id.as_i64())
    .bind(totals.products_price().cents())
    .bind(totals.products_discount_price().cents())
    .bind(totals.shipping_price().cents())
    .bind(totals.tax_price().cents())
    .bind(totals.total_price().cents())
    .bind(OrderStatus::Pending.as_str())
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await?;

    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, product_name, quantity,
                                     unit_price_cents, discount)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(item.product_id.as_i64())
        .bind(&item.product_name)
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.cents())
        .bind(i16::from(item.discount.percent()))
        .execute(&mut *conn)
        .await?;
    }

    Ok(Order::placed(OrderId::new(id), order))
}

/// Compare-and-set status write. When nothing matches, reads the row again
/// to tell a missing order from one whose status moved on.
async fn set_status_in(
    conn: &mut PgConnection,
    id: OrderId,
    expected: OrderStatus,
    next: OrderStatus,
    at: DateTime<Utc>,
) -> std::result::Result<Order, RepositoryError> {
    let row = sqlx::query(&format!(
        "UPDATE orders SET status = $3, updated_at = $4 \
         WHERE id = $1 AND status = $2 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id.as_i64())
    .bind(expected.as_str())
    .bind(next.as_str())
    .bind(at)
    .fetch_optional(&mut *conn)
    .await
    .map_err(StoreError::from)?;

    if let Some(row) = row {
        return Ok(PostgresStore::row_to_order(&row)?);
    }

    let actual: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::from)?;

    match actual {
        None => Err(RepositoryError::OrderNotFound(id)),
        Some(actual) => Err(RepositoryError::StatusConflict {
            order_id: id,
            expected,
            actual: actual
                .parse()
                .map_err(|e: domain::UnknownStatus| StoreError::corrupt("orders", e.to_string()))?,
        }),
    }
}

fn discount_from_column(table: &'static str, value: i16) -> Result<Discount> {
    u8::try_from(value)
        .ok()
        .and_then(Discount::new)
        .ok_or_else(|| StoreError::corrupt(table, format!("discount {value}")))
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn find_products(
        &self,
        ids: &[ProductId],
    ) -> std::result::Result<Vec<ProductSnapshot>, RepositoryError> {
        let ids: Vec<i64> = ids.iter().map(ProductId::as_i64).collect();
        let rows = sqlx::query(
            "SELECT id, name, price_cents, discount FROM products WHERE id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let products = rows
            .iter()
            .map(|row| -> Result<ProductSnapshot> {
                Ok(ProductSnapshot::new(
                    ProductId::new(row.try_get("id")?),
                    row.try_get::<String, _>("name")?,
                    Money::from_cents(row.try_get("price_cents")?),
                    discount_from_column("products", row.try_get("discount")?)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(products)
    }
}

#[async_trait]
impl ProductStock for PostgresStore {
    async fn try_reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> std::result::Result<bool, RepositoryError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(reserve_in(&mut conn, product_id, quantity).await?)
    }

    async fn release(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> std::result::Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        if restock_in(&mut conn, product_id, quantity).await? {
            Ok(())
        } else {
            Err(RepositoryError::ProductNotFound(product_id))
        }
    }

    async fn available(
        &self,
        product_id: ProductId,
    ) -> std::result::Result<Option<u32>, RepositoryError> {
        let available: Option<i32> =
            sqlx::query_scalar("SELECT total_quantities FROM products WHERE id = $1")
                .bind(product_id.as_i64())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)?;

        available
            .map(|n| {
                u32::try_from(n)
                    .map_err(|_| StoreError::corrupt("products", format!("total_quantities {n}")))
            })
            .transpose()
            .map_err(RepositoryError::from)
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn place(&self, order: NewOrder) -> std::result::Result<Order, RepositoryError> {
        self.place_order(order).await
    }

    async fn find(
        &self,
        id: OrderId,
        load: Load,
    ) -> std::result::Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let orders = self.hydrate(row.into_iter().collect(), load).await?;
        Ok(orders.into_iter().next())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        load: Load,
    ) -> std::result::Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(self.hydrate(rows, load).await?)
    }

    async fn list_all(&self, load: Load) -> std::result::Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(self.hydrate(rows, load).await?)
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> std::result::Result<Order, RepositoryError> {
        if next == OrderStatus::Cancelled {
            return self.cancel_order(id, expected, at).await;
        }
        check_edge(id, expected, next)?;
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        set_status_in(&mut conn, id, expected, next, at).await
    }

    async fn cancel_and_restock(
        &self,
        id: OrderId,
        expected: OrderStatus,
        at: DateTime<Utc>,
    ) -> std::result::Result<Order, RepositoryError> {
        self.cancel_order(id, expected, at).await
    }
}

#[async_trait]
impl OrderStatistics for PostgresStore {
    async fn count_orders(&self) -> std::result::Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn sum_revenue(
        &self,
        statuses: &[OrderStatus],
        window: Option<TimeRange>,
    ) -> std::result::Result<Money, RepositoryError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_price_cents), 0)::BIGINT
            FROM orders
            WHERE status = ANY($1)
              AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
              AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
            "#,
        )
        .bind(&statuses)
        .bind(window.map(|w| w.start))
        .bind(window.map(|w| w.end))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(Money::from_cents(cents))
    }
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn find_user(
        &self,
        id: UserId,
    ) -> std::result::Result<Option<UserSummary>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let user = row
            .map(|row| -> Result<UserSummary> {
                Ok(UserSummary {
                    id: UserId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                })
            })
            .transpose()?;
        Ok(user)
    }

    async fn count_users(&self) -> std::result::Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
