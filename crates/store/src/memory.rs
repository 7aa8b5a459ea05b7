use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{
    Load, Money, NewOrder, Order, OrderRepository, OrderStatistics, OrderStatus, ProductCatalog,
    ProductSnapshot, ProductStock, RepositoryError, TimeRange, UserDirectory, UserSummary,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ProductRow {
    snapshot: ProductSnapshot,
    available: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, ProductRow>,
    users: HashMap<UserId, UserSummary>,
    /// Stored with items; keyed by insertion sequence.
    orders: BTreeMap<OrderId, Order>,
    next_order_id: i64,
    fail_on_order_insert: bool,
    fail_on_restock: bool,
}

impl MemoryState {
    /// Returns each line's quantity to stock, all lines or none.
    fn restock(&mut self, lines: &[(ProductId, u32)]) -> Result<(), RepositoryError> {
        if self.fail_on_restock {
            return Err(RepositoryError::backend(std::io::Error::other(
                "stock release failed",
            )));
        }
        if let Some((missing, _)) = lines
            .iter()
            .find(|(id, _)| !self.products.contains_key(id))
        {
            return Err(RepositoryError::ProductNotFound(*missing));
        }
        for (product_id, quantity) in lines {
            if let Some(row) = self.products.get_mut(product_id) {
                row.available = row.available.saturating_add(*quantity);
            }
        }
        Ok(())
    }

    /// Applies a compare-and-set transition to a copy of the stored order.
    /// Nothing is written.
    fn transitioned(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut order = self
            .orders
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::OrderNotFound(id))?;
        if order.status() != expected {
            return Err(RepositoryError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status(),
            });
        }
        order
            .request_transition(next, at)
            .map_err(RepositoryError::backend)?;
        Ok(order)
    }

    fn commit(&mut self, order: Order) -> Order {
        let bare = shape(&order, Load::Bare);
        self.orders.insert(order.id(), order);
        bare
    }
}

/// In-memory store implementation for testing and local development.
///
/// Every operation takes the single state lock, so a reservation's
/// availability check and decrement happen under one write guard.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product with the given available stock.
    pub async fn insert_product(&self, product: ProductSnapshot, available: u32) {
        self.state.write().await.products.insert(
            product.product_id,
            ProductRow {
                snapshot: product,
                available,
            },
        );
    }

    /// Adds or replaces a user.
    pub async fn insert_user(&self, user: UserSummary) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Returns a product's available stock.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|row| row.available)
    }

    /// Returns the number of persisted orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Makes subsequent order inserts fail, to exercise rollback paths.
    pub async fn set_fail_on_order_insert(&self, fail: bool) {
        self.state.write().await.fail_on_order_insert = fail;
    }

    /// Makes subsequent stock releases fail, to exercise rollback paths.
    pub async fn set_fail_on_restock(&self, fail: bool) {
        self.state.write().await.fail_on_restock = fail;
    }
}

fn shape(order: &Order, load: Load) -> Order {
    match load {
        Load::WithItems => order.clone(),
        Load::Bare => Order::restore(
            order.id(),
            order.user_id(),
            *order.totals(),
            order.status(),
            order.created_at(),
            order.updated_at(),
        ),
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn find_products(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<ProductSnapshot>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id))
            .map(|row| row.snapshot.clone())
            .collect())
    }
}

#[async_trait]
impl ProductStock for InMemoryStore {
    async fn try_reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.products.get_mut(&product_id) {
            Some(row) if row.available >= quantity => {
                row.available -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<(), RepositoryError> {
        self.state
            .write()
            .await
            .restock(&[(product_id, quantity)])
    }

    async fn available(&self, product_id: ProductId) -> Result<Option<u32>, RepositoryError> {
        Ok(self.stock_of(product_id).await)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn place(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;

        // Check everything before touching stock so a rejection mutates nothing.
        for item in &order.items {
            let available = state
                .products
                .get(&item.product_id)
                .map_or(0, |row| row.available);
            if available < item.quantity {
                return Err(RepositoryError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                });
            }
        }
        if state.fail_on_order_insert {
            return Err(RepositoryError::backend(std::io::Error::other(
                "order insert failed",
            )));
        }

        for item in &order.items {
            if let Some(row) = state.products.get_mut(&item.product_id) {
                row.available -= item.quantity;
            }
        }
        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let order = Order::placed(id, order);
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn find(&self, id: OrderId, load: Load) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id).map(|order| shape(order, load)))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        load: Load,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .rev()
            .filter(|order| order.is_owned_by(user_id))
            .map(|order| shape(order, load))
            .collect())
    }

    async fn list_all(&self, load: Load) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .rev()
            .map(|order| shape(order, load))
            .collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        if next == OrderStatus::Cancelled {
            return self.cancel_and_restock(id, expected, at).await;
        }

        let mut state = self.state.write().await;
        let updated = state.transitioned(id, expected, next, at)?;
        Ok(state.commit(updated))
    }

    async fn cancel_and_restock(
        &self,
        id: OrderId,
        expected: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        let updated = state.transitioned(id, expected, OrderStatus::Cancelled, at)?;

        if expected.holds_reservation() {
            let lines: Vec<_> = updated
                .items()
                .iter()
                .map(|item| (item.product_id, item.quantity))
                .collect();
            state.restock(&lines)?;
        }
        Ok(state.commit(updated))
    }
}

#[async_trait]
impl OrderStatistics for InMemoryStore {
    async fn count_orders(&self) -> Result<u64, RepositoryError> {
        Ok(self.state.read().await.orders.len() as u64)
    }

    async fn sum_revenue(
        &self,
        statuses: &[OrderStatus],
        window: Option<TimeRange>,
    ) -> Result<Money, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| statuses.contains(&order.status()))
            .filter(|order| window.is_none_or(|w| w.contains(order.created_at())))
            .map(|order| order.totals().total_price())
            .sum())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<UserSummary>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        Ok(self.state.read().await.users.len() as u64)
    }
}
