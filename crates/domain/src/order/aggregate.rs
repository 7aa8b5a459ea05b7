//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};

use super::{Money, OrderError, OrderItem, OrderStatus};

/// Monetary breakdown of an order.
///
/// `total_price` is always derived from the other four components, so the
/// identity `total = products - discount + shipping + tax` cannot be broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTotals {
    products_price: Money,
    products_discount_price: Money,
    shipping_price: Money,
    tax_price: Money,
    total_price: Money,
}

impl OrderTotals {
    pub fn new(
        products_price: Money,
        products_discount_price: Money,
        shipping_price: Money,
        tax_price: Money,
    ) -> Self {
        Self {
            products_price,
            products_discount_price,
            shipping_price,
            tax_price,
            total_price: products_price - products_discount_price + shipping_price + tax_price,
        }
    }

    /// Like [`OrderTotals::new`], but returns `None` if the total overflows.
    pub fn checked_new(
        products_price: Money,
        products_discount_price: Money,
        shipping_price: Money,
        tax_price: Money,
    ) -> Option<Self> {
        let total_price = products_price
            .checked_sub(products_discount_price)?
            .checked_add(shipping_price)?
            .checked_add(tax_price)?;
        Some(Self {
            products_price,
            products_discount_price,
            shipping_price,
            tax_price,
            total_price,
        })
    }

    /// Sum of unit price times quantity over all lines, before discount.
    pub fn products_price(&self) -> Money {
        self.products_price
    }

    /// Sum of per-line discount amounts.
    pub fn products_discount_price(&self) -> Money {
        self.products_discount_price
    }

    pub fn shipping_price(&self) -> Money {
        self.shipping_price
    }

    pub fn tax_price(&self) -> Money {
        self.tax_price
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }
}

/// A fully priced order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub created_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// Status only changes through [`Order::request_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    /// `None` when loaded without its items.
    items: Option<Vec<OrderItem>>,
    totals: OrderTotals,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Materializes a freshly inserted order in `Pending` status.
    pub fn placed(id: OrderId, new_order: NewOrder) -> Self {
        Self {
            id,
            user_id: new_order.user_id,
            items: Some(new_order.items),
            totals: new_order.totals,
            status: OrderStatus::Pending,
            created_at: new_order.created_at,
            updated_at: new_order.created_at,
        }
    }

    /// Rebuilds an order from stored columns, without items.
    pub fn restore(
        id: OrderId,
        user_id: UserId,
        totals: OrderTotals,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            items: None,
            totals,
            status,
            created_at,
            updated_at,
        }
    }

    /// Attaches loaded items.
    pub fn with_items(mut self, items: Vec<OrderItem>) -> Self {
        self.items = Some(items);
        self
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the items, or an empty slice if they were not loaded.
    pub fn items(&self) -> &[OrderItem] {
        self.items.as_deref().unwrap_or_default()
    }

    /// Returns true if the items were loaded with the order.
    pub fn items_loaded(&self) -> bool {
        self.items.is_some()
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if `user_id` placed this order.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Lifecycle
impl Order {
    /// Moves the order to `target`, returning the status it left.
    ///
    /// Every edge missing from the lifecycle table is rejected, including
    /// no-ops and backward moves. A rejected request leaves the order untouched.
    pub fn request_transition(
        &mut self,
        target: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        if !from.can_transition_to(target) {
            return Err(OrderError::InvalidTransition {
                order_id: self.id,
                from,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = at;
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Discount, ProductSnapshot};
    use common::ProductId;

    fn placed_order() -> Order {
        let product = ProductSnapshot::new(
            ProductId::new(7),
            "Widget",
            Money::from_cents(1000),
            Discount::new(10).unwrap(),
        );
        let item = OrderItem::from_snapshot(&product, 2);
        let totals = OrderTotals::new(
            item.line_price(),
            item.line_discount(),
            Money::from_cents(300),
            Money::from_cents(100),
        );
        Order::placed(
            OrderId::new(1),
            NewOrder {
                user_id: UserId::new(5),
                items: vec![item],
                totals,
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_totals_identity() {
        let totals = OrderTotals::new(
            Money::from_cents(2000),
            Money::from_cents(200),
            Money::from_cents(300),
            Money::from_cents(100),
        );
        assert_eq!(totals.total_price().cents(), 2200);
    }

    #[test]
    fn test_placed_order_starts_pending() {
        let order = placed_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.items_loaded());
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.created_at(), order.updated_at());
    }

    #[test]
    fn test_forward_transitions() {
        let mut order = placed_order();
        let at = Utc::now();

        let prior = order.request_transition(OrderStatus::Paid, at).unwrap();
        assert_eq!(prior, OrderStatus::Pending);
        assert_eq!(order.updated_at(), at);

        let prior = order.request_transition(OrderStatus::Delivered, at).unwrap();
        assert_eq!(prior, OrderStatus::Paid);
        assert!(order.is_terminal());
    }

    #[test]
    fn test_pending_cannot_skip_to_delivered() {
        let mut order = placed_order();
        let err = order
            .request_transition(OrderStatus::Delivered, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Delivered,
                ..
            }
        ));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_delivered_is_immutable() {
        let mut order = placed_order();
        order.request_transition(OrderStatus::Paid, Utc::now()).unwrap();
        order
            .request_transition(OrderStatus::Delivered, Utc::now())
            .unwrap();

        for target in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert!(order.request_transition(target, Utc::now()).is_err());
        }
    }

    #[test]
    fn test_restored_order_has_no_items() {
        let order = Order::restore(
            OrderId::new(3),
            UserId::new(1),
            OrderTotals::default(),
            OrderStatus::Paid,
            Utc::now(),
            Utc::now(),
        );
        assert!(!order.items_loaded());
        assert!(order.items().is_empty());
        assert!(order.is_owned_by(UserId::new(1)));
    }
}
