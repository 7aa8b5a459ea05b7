//! Order aggregate and related types.

mod aggregate;
mod pricing;
mod service;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order, OrderTotals};
pub use pricing::{CartLine, PricedCart, price_cart};
pub use service::{CheckoutRequest, OrderDetails, OrderService};
pub use state::{OrderStatus, UnknownStatus};
pub use value_objects::{Discount, Money, OrderItem, ProductSnapshot};

use common::{OrderId, ProductId};
use thiserror::Error;

/// Reasons a cart cannot be turned into an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The cart has no lines.
    #[error("Cart is empty")]
    Empty,

    /// A line asks for zero, a negative or an unrepresentable quantity.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// A line references a product missing from the catalog.
    #[error("Product {product_id} does not exist")]
    UnknownProduct { product_id: ProductId },

    /// Line or order totals exceed the representable amount.
    #[error("Order amount is too large")]
    AmountTooLarge,

    /// Shipping or tax is negative.
    #[error("Invalid {field}: {amount} (must not be negative)")]
    NegativeCharge { field: &'static str, amount: Money },
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The submitted cart is malformed.
    #[error("Invalid cart: {0}")]
    InvalidCart(#[from] CartError),

    /// Not enough stock to cover a line.
    #[error("Product {product_id} is out of stock (requested {requested})")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
    },

    /// The requested status change is not an edge of the lifecycle.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The order does not exist or is not visible to the caller.
    #[error("Order not found: {0}")]
    NotFound(OrderId),
}
