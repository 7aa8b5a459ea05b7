//! Collaborator interfaces consumed by the order core.
//!
//! Products, users and persistence are owned elsewhere; the order core
//! reaches them only through these traits. All implementations must be
//! thread-safe (Send + Sync).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::Serialize;
use thiserror::Error;

use crate::order::{Money, NewOrder, Order, OrderDetails, OrderStatus, ProductSnapshot};

/// Errors reported by store implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A compare-and-set status update found a different current status.
    #[error("Status conflict for order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A product could not cover the requested quantity.
    #[error("Insufficient stock for product {product_id} (requested {requested})")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// Stock was returned to a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The backing store failed.
    #[error("Store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    /// Wraps any backend failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RepositoryError::Backend(Box::new(err))
    }
}

/// Which relations a repository read should load alongside the order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Load {
    /// Order columns only.
    #[default]
    Bare,
    /// Order columns and all of its items.
    WithItems,
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Read-only user reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// Rendered invoice, ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDocument {
    pub content_type: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Failure of the invoice renderer.
#[derive(Debug, Error)]
#[error("Invoice rendering failed: {0}")]
pub struct InvoiceError(pub String);

/// Current catalog prices, read once per checkout.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the snapshots of the products that exist among `ids`.
    ///
    /// Missing products are simply absent from the result.
    async fn find_products(&self, ids: &[ProductId])
    -> Result<Vec<ProductSnapshot>, RepositoryError>;
}

/// Atomic stock reservation against a product's available quantity.
#[async_trait]
pub trait ProductStock: Send + Sync {
    /// Decrements available stock by `quantity` if and only if enough is available.
    ///
    /// The check and the decrement must be one indivisible operation.
    /// Returns `false` without mutating anything when stock is insufficient
    /// or the product does not exist.
    async fn try_reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError>;

    /// Returns `quantity` units to available stock.
    ///
    /// Fails with `ProductNotFound` for an unknown product.
    async fn release(&self, product_id: ProductId, quantity: u32) -> Result<(), RepositoryError>;

    /// Returns the currently available stock, or `None` for an unknown product.
    async fn available(&self, product_id: ProductId) -> Result<Option<u32>, RepositoryError>;
}

/// Persistence for orders and their items.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Reserves stock for every item and inserts the order with its items,
    /// in `Pending` status, as one unit.
    ///
    /// Fails with `InsufficientStock` for the first item that cannot be
    /// covered. On any failure no stock is taken and nothing is inserted.
    async fn place(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Loads one order.
    async fn find(&self, id: OrderId, load: Load) -> Result<Option<Order>, RepositoryError>;

    /// Lists a user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId, load: Load)
    -> Result<Vec<Order>, RepositoryError>;

    /// Lists every order, newest first.
    async fn list_all(&self, load: Load) -> Result<Vec<Order>, RepositoryError>;

    /// Compare-and-set status update.
    ///
    /// Writes `next` only if the stored status is still `expected`. Fails with
    /// `StatusConflict` otherwise and with `OrderNotFound` for a missing order.
    /// A move to `Cancelled` behaves as [`OrderRepository::cancel_and_restock`].
    /// Returns the updated order without items.
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;

    /// Compare-and-set move to `Cancelled`.
    ///
    /// When `expected` holds a stock reservation, every item's quantity is
    /// returned to stock in the same unit as the status write; if any release
    /// fails the status is left unchanged. Fails like
    /// [`OrderRepository::update_status`]. Returns the updated order without
    /// items.
    async fn cancel_and_restock(
        &self,
        id: OrderId,
        expected: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;
}

/// Aggregation queries over the order collection.
#[async_trait]
pub trait OrderStatistics: Send + Sync {
    /// Number of orders in any status.
    async fn count_orders(&self) -> Result<u64, RepositoryError>;

    /// Sum of `total_price` over orders in `statuses`, optionally restricted
    /// to orders created within `window`.
    async fn sum_revenue(
        &self,
        statuses: &[OrderStatus],
        window: Option<TimeRange>,
    ) -> Result<Money, RepositoryError>;
}

/// Read-only access to user reference data.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserSummary>, RepositoryError>;

    async fn count_users(&self) -> Result<u64, RepositoryError>;
}

/// Produces a downloadable invoice for a fully loaded order.
#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, order: &OrderDetails) -> Result<InvoiceDocument, InvoiceError>;
}

/// A store able to back every order use case.
pub trait OrderBackend: OrderRepository + ProductCatalog + ProductStock + UserDirectory {}

impl<T> OrderBackend for T where T: OrderRepository + ProductCatalog + ProductStock + UserDirectory {}
