//! Order-processing core.
//!
//! This crate provides:
//! - Money and discount value objects
//! - Cart pricing (pure computation over catalog snapshots)
//! - The order status lifecycle (`Pending → Paid → Delivered`, plus `Cancelled`)
//! - Collaborator ports for stock, persistence, users and invoices
//! - `OrderService`, which composes them into the checkout use cases

pub mod caller;
pub mod error;
pub mod order;
pub mod ports;

pub use caller::Caller;
pub use error::DomainError;
pub use order::{
    CartError, CartLine, CheckoutRequest, Discount, Money, NewOrder, Order, OrderDetails,
    OrderError, OrderItem, OrderService, OrderStatus, OrderTotals, PricedCart, ProductSnapshot,
    UnknownStatus, price_cart,
};
pub use ports::{
    InvoiceDocument, InvoiceError, InvoiceRenderer, Load, OrderBackend, OrderRepository,
    OrderStatistics, ProductCatalog, ProductStock, RepositoryError, TimeRange, UserDirectory,
    UserSummary,
};
