//! Order service orchestrating pricing, stock reservation, persistence and
//! the status lifecycle.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, UserId};

use crate::caller::Caller;
use crate::error::DomainError;
use crate::ports::{
    InvoiceDocument, InvoiceRenderer, Load, OrderBackend, RepositoryError, UserSummary,
};

use super::pricing::referenced_products;
use super::{
    CartLine, Money, NewOrder, Order, OrderError, OrderStatus, price_cart,
};

/// A checkout request: cart lines plus the shipping and tax decided by policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    pub shipping_price: Money,
    pub tax_price: Money,
}

/// An order together with the related data needed to display or invoice it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    /// Loaded with its items.
    pub order: Order,
    /// `None` if the user record no longer exists.
    pub user: Option<UserSummary>,
}

/// Service for managing orders.
///
/// Holds no per-request state; every call receives its caller explicitly
/// and all shared state lives in the store.
pub struct OrderService<S: OrderBackend> {
    store: S,
    invoices: Arc<dyn InvoiceRenderer>,
}

impl<S: OrderBackend> OrderService<S> {
    /// Creates a new order service over the given store and invoice renderer.
    pub fn new(store: S, invoices: Arc<dyn InvoiceRenderer>) -> Self {
        Self { store, invoices }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converts a cart into a `Pending` order.
    ///
    /// Stock for every line is reserved in the same store unit that persists
    /// the order, so a failed checkout leaves stock untouched.
    #[tracing::instrument(skip(self, request), fields(user_id = %caller.user_id, lines = request.lines.len()))]
    pub async fn create_order(
        &self,
        caller: Caller,
        request: CheckoutRequest,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();

        let catalog = self
            .store
            .find_products(&referenced_products(&request.lines))
            .await?;
        let priced = price_cart(
            &request.lines,
            &catalog,
            request.shipping_price,
            request.tax_price,
        )
        .map_err(|e| {
            metrics::counter!("orders_rejected_total", "reason" => "invalid_cart").increment(1);
            tracing::info!(error = %e, "cart rejected");
            OrderError::from(e)
        })?;

        let new_order = NewOrder {
            user_id: caller.user_id,
            items: priced.items,
            totals: priced.totals,
            created_at: Utc::now(),
        };

        match self.store.place(new_order).await {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                metrics::histogram!("order_checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id(),
                    total = %order.totals().total_price(),
                    "order created"
                );
                Ok(order)
            }
            Err(RepositoryError::InsufficientStock {
                product_id,
                requested,
            }) => {
                tracing::warn!(%product_id, requested, "insufficient stock");
                metrics::counter!("orders_rejected_total", "reason" => "out_of_stock").increment(1);
                Err(OrderError::OutOfStock {
                    product_id,
                    requested,
                }
                .into())
            }
            Err(e) => {
                tracing::error!(error = %e, "order placement failed");
                metrics::counter!("orders_rejected_total", "reason" => "persistence").increment(1);
                Err(e.into())
            }
        }
    }

    /// Loads an order with its items and owner.
    ///
    /// Another user's order is reported as not found unless the caller is an
    /// administrator.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn get_order(
        &self,
        caller: Caller,
        order_id: OrderId,
    ) -> Result<OrderDetails, DomainError> {
        let order = self.load_visible(caller, order_id).await?;
        let user = self.store.find_user(order.user_id()).await?;
        Ok(OrderDetails { order, user })
    }

    /// Lists a user's orders with their items. Having no orders is not an error.
    #[tracing::instrument(skip(self), fields(caller_id = %caller.user_id))]
    pub async fn list_orders_for_user(
        &self,
        caller: Caller,
        user_id: UserId,
    ) -> Result<Vec<Order>, DomainError> {
        if !caller.can_view(user_id) {
            return Err(DomainError::Forbidden {
                user_id: caller.user_id,
            });
        }
        Ok(self.store.list_for_user(user_id, Load::WithItems).await?)
    }

    /// Lists every order (administrators only).
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn list_all_orders(&self, caller: Caller) -> Result<Vec<Order>, DomainError> {
        caller.require_admin()?;
        Ok(self.store.list_all(Load::Bare).await?)
    }

    /// Moves an order to `target` (administrators only).
    ///
    /// A move to `Cancelled` goes through [`OrderService::cancel_order`] so
    /// the order's stock is released.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn update_status(
        &self,
        caller: Caller,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, DomainError> {
        caller.require_admin()?;
        if target == OrderStatus::Cancelled {
            return self.cancel_order(caller, order_id).await;
        }

        let order = self.load_visible(caller, order_id).await?;
        let (updated, _) = self.transition(order, target).await?;
        Ok(updated)
    }

    /// Cancels an order and returns its stock.
    ///
    /// Administrators may cancel `Pending` and `Paid` orders; owners may
    /// cancel their own `Pending` orders. Stock is released only by the
    /// request whose status update wins.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn cancel_order(
        &self,
        caller: Caller,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        let order = self.load_visible(caller, order_id).await?;

        if !caller.is_admin && order.status() != OrderStatus::Pending {
            // Illegal edges are reported before the permission check.
            if !order.status().can_transition_to(OrderStatus::Cancelled) {
                return Err(OrderError::InvalidTransition {
                    order_id,
                    from: order.status(),
                    to: OrderStatus::Cancelled,
                }
                .into());
            }
            return Err(DomainError::Forbidden {
                user_id: caller.user_id,
            });
        }

        let (updated, prior) = self.transition(order, OrderStatus::Cancelled).await?;

        if prior.holds_reservation() {
            let units: u64 = updated.items().iter().map(|i| u64::from(i.quantity)).sum();
            metrics::counter!("stock_reservations_released_total").increment(units);
            tracing::info!(%order_id, %prior, units, "stock released for cancelled order");
        }
        Ok(updated)
    }

    /// Renders the invoice of a visible order.
    #[tracing::instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn export_invoice(
        &self,
        caller: Caller,
        order_id: OrderId,
    ) -> Result<InvoiceDocument, DomainError> {
        let details = self.get_order(caller, order_id).await?;
        let document = self.invoices.render(&details).await?;
        tracing::info!(%order_id, bytes = document.bytes.len(), "invoice rendered");
        Ok(document)
    }

    /// Loads an order with items, hiding orders the caller may not see.
    async fn load_visible(&self, caller: Caller, order_id: OrderId) -> Result<Order, DomainError> {
        match self.store.find(order_id, Load::WithItems).await? {
            Some(order) if caller.can_view(order.user_id()) => Ok(order),
            _ => Err(OrderError::NotFound(order_id).into()),
        }
    }

    /// Validates the transition locally, then persists it with a compare-and-set
    /// on the status that was read. Cancellation restocks in the same write.
    /// Returns the updated order and its prior status.
    async fn transition(
        &self,
        mut order: Order,
        target: OrderStatus,
    ) -> Result<(Order, OrderStatus), DomainError> {
        let order_id = order.id();
        let now = Utc::now();
        let prior = order.request_transition(target, now).inspect_err(|e| {
            tracing::info!(%order_id, %target, error = %e, "status transition rejected");
        })?;

        let written = if target == OrderStatus::Cancelled {
            self.store.cancel_and_restock(order_id, prior, now).await
        } else {
            self.store.update_status(order_id, prior, target, now).await
        };

        let updated = written.map_err(|e| match e {
            RepositoryError::StatusConflict { actual, .. } => {
                tracing::info!(%order_id, %actual, %target, "status changed concurrently");
                DomainError::from(OrderError::InvalidTransition {
                    order_id,
                    from: actual,
                    to: target,
                })
            }
            RepositoryError::OrderNotFound(id) => OrderError::NotFound(id).into(),
            other => other.into(),
        })?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => prior.as_str(),
            "to" => target.as_str()
        )
        .increment(1);
        tracing::info!(%order_id, from = %prior, to = %target, "order status updated");

        Ok((updated.with_items(order.items().to_vec()), prior))
    }
}
