//! Integration tests for the order service.
//!
//! These tests run the checkout and lifecycle use cases against the
//! in-memory store, including stock accounting under concurrent requests.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{
    Caller, CartError, CartLine, CheckoutRequest, Discount, DomainError, InvoiceDocument,
    InvoiceError, InvoiceRenderer, Money, OrderDetails, OrderError, OrderService, OrderStatus,
    ProductSnapshot, UserSummary,
};
use futures_util::future::join_all;
use store::InMemoryStore;

const WIDGET: ProductId = ProductId::new(7);
const GADGET: ProductId = ProductId::new(9);

const ALICE: UserId = UserId::new(1);
const BOB: UserId = UserId::new(2);
const ADMIN: UserId = UserId::new(100);

/// Renders a one-line plain text invoice.
struct StubRenderer;

#[async_trait]
impl InvoiceRenderer for StubRenderer {
    async fn render(&self, details: &OrderDetails) -> Result<InvoiceDocument, InvoiceError> {
        let owner = details
            .user
            .as_ref()
            .map(|u| u.name.clone())
            .ok_or_else(|| InvoiceError("unknown user".to_string()))?;
        Ok(InvoiceDocument {
            content_type: "text/plain".to_string(),
            file_name: format!("invoice-{}.txt", details.order.id()),
            bytes: format!("{} {}", owner, details.order.totals().total_price()).into_bytes(),
        })
    }
}

async fn create_service(widget_stock: u32, gadget_stock: u32) -> OrderService<InMemoryStore> {
    let store = InMemoryStore::new();
    store
        .insert_product(
            ProductSnapshot::new(
                WIDGET,
                "Widget",
                Money::from_cents(1000),
                Discount::new(10).unwrap(),
            ),
            widget_stock,
        )
        .await;
    store
        .insert_product(
            ProductSnapshot::new(GADGET, "Gadget", Money::from_cents(250), Discount::none()),
            gadget_stock,
        )
        .await;
    for (id, name) in [(ALICE, "Alice"), (BOB, "Bob"), (ADMIN, "Admin")] {
        store
            .insert_user(UserSummary {
                id,
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
            })
            .await;
    }
    OrderService::new(store, Arc::new(StubRenderer))
}

fn checkout(lines: &[(ProductId, i64)]) -> CheckoutRequest {
    CheckoutRequest {
        lines: lines
            .iter()
            .map(|(id, quantity)| CartLine::new(*id, *quantity))
            .collect(),
        shipping_price: Money::from_cents(300),
        tax_price: Money::from_cents(100),
    }
}

fn alice() -> Caller {
    Caller::customer(ALICE)
}

fn admin() -> Caller {
    Caller::admin(ADMIN)
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn creates_pending_order_and_reserves_stock() {
        let service = create_service(5, 1).await;

        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 2)]))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.user_id(), ALICE);
        assert_eq!(order.totals().products_price().cents(), 2000);
        assert_eq!(order.totals().products_discount_price().cents(), 200);
        assert_eq!(order.totals().total_price().cents(), 2200);
        assert_eq!(order.items().len(), 1);
        assert_eq!(service.store().stock_of(WIDGET).await, Some(3));
    }

    #[tokio::test]
    async fn insufficient_stock_rejects_and_keeps_stock() {
        let service = create_service(5, 1).await;

        let err = service
            .create_order(alice(), checkout(&[(GADGET, 2)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::OutOfStock {
                product_id: GADGET,
                requested: 2
            })
        ));
        assert_eq!(service.store().stock_of(GADGET).await, Some(1));
        assert_eq!(service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn failure_on_later_line_keeps_earlier_stock() {
        let service = create_service(5, 1).await;

        let err = service
            .create_order(alice(), checkout(&[(WIDGET, 3), (GADGET, 2)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::OutOfStock { .. })
        ));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
        assert_eq!(service.store().stock_of(GADGET).await, Some(1));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_stock() {
        let service = create_service(5, 1).await;
        service.store().set_fail_on_order_insert(true).await;

        let err = service
            .create_order(alice(), checkout(&[(WIDGET, 2), (GADGET, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Repository(_)));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
        assert_eq!(service.store().stock_of(GADGET).await, Some(1));
        assert_eq!(service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn invalid_carts_are_rejected_before_reserving() {
        let service = create_service(5, 1).await;

        let err = service
            .create_order(alice(), checkout(&[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidCart(CartError::Empty))
        ));

        let err = service
            .create_order(alice(), checkout(&[(WIDGET, 0)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidCart(CartError::InvalidQuantity { .. }))
        ));

        let err = service
            .create_order(alice(), checkout(&[(ProductId::new(42), 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidCart(CartError::UnknownProduct { .. }))
        ));

        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
    }

    #[tokio::test]
    async fn oversized_amounts_are_rejected_as_invalid_cart() {
        let service = create_service(5, 1).await;
        let mut request = checkout(&[(WIDGET, 1)]);
        request.shipping_price = Money::from_cents(i64::MAX);

        let err = service.create_order(alice(), request).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidCart(CartError::AmountTooLarge))
        ));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
        assert_eq!(service.store().order_count().await, 0);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn admin_walks_order_to_delivered() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        let paid = service
            .update_status(admin(), order.id(), OrderStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.status(), OrderStatus::Paid);
        assert_eq!(paid.items().len(), 1);

        let delivered = service
            .update_status(admin(), order.id(), OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status(), OrderStatus::Delivered);
        assert!(delivered.is_terminal());
    }

    #[tokio::test]
    async fn skipping_payment_is_rejected() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        let err = service
            .update_status(admin(), order.id(), OrderStatus::Delivered)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Delivered,
                ..
            })
        ));
        let details = service.get_order(admin(), order.id()).await.unwrap();
        assert_eq!(details.order.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn customers_cannot_update_status() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        let err = service
            .update_status(alice(), order.id(), OrderStatus::Paid)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Forbidden { user_id: ALICE }));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let service = create_service(5, 1).await;

        let err = service
            .update_status(admin(), OrderId::new(999), OrderStatus::Paid)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::NotFound(_))
        ));
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn owner_cancels_pending_order_and_stock_returns() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 2)]))
            .await
            .unwrap();
        assert_eq!(service.store().stock_of(WIDGET).await, Some(3));

        let cancelled = service.cancel_order(alice(), order.id()).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
    }

    #[tokio::test]
    async fn admin_cancels_paid_order_via_status_update() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 2)]))
            .await
            .unwrap();
        service
            .update_status(admin(), order.id(), OrderStatus::Paid)
            .await
            .unwrap();

        let cancelled = service
            .update_status(admin(), order.id(), OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
    }

    #[tokio::test]
    async fn owner_cannot_cancel_paid_order() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();
        service
            .update_status(admin(), order.id(), OrderStatus::Paid)
            .await
            .unwrap();

        let err = service.cancel_order(alice(), order.id()).await.unwrap_err();

        assert!(matches!(err, DomainError::Forbidden { .. }));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(4));
    }

    #[tokio::test]
    async fn delivered_order_cannot_be_cancelled() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();
        service
            .update_status(admin(), order.id(), OrderStatus::Paid)
            .await
            .unwrap();
        service
            .update_status(admin(), order.id(), OrderStatus::Delivered)
            .await
            .unwrap();

        let err = service.cancel_order(admin(), order.id()).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled,
                ..
            })
        ));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(4));
    }

    #[tokio::test]
    async fn failed_restock_leaves_order_pending() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 2)]))
            .await
            .unwrap();
        service.store().set_fail_on_restock(true).await;

        let err = service.cancel_order(alice(), order.id()).await.unwrap_err();

        assert!(matches!(err, DomainError::Repository(_)));
        let details = service.get_order(alice(), order.id()).await.unwrap();
        assert_eq!(details.order.status(), OrderStatus::Pending);
        assert_eq!(service.store().stock_of(WIDGET).await, Some(3));

        service.store().set_fail_on_restock(false).await;
        let cancelled = service.cancel_order(alice(), order.id()).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
    }

    #[tokio::test]
    async fn cancelling_twice_is_rejected() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();
        service.cancel_order(alice(), order.id()).await.unwrap();

        let err = service.cancel_order(alice(), order.id()).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidTransition { .. })
        ));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
    }
}

mod visibility {
    use super::*;

    #[tokio::test]
    async fn owner_sees_order_with_items_and_user() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1), (GADGET, 1)]))
            .await
            .unwrap();

        let details = service.get_order(alice(), order.id()).await.unwrap();

        assert_eq!(details.order.items().len(), 2);
        assert_eq!(details.user.unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn other_users_order_looks_missing() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        let err = service
            .get_order(Caller::customer(BOB), order.id())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::NotFound(_))
        ));

        assert!(service.get_order(admin(), order.id()).await.is_ok());
    }

    #[tokio::test]
    async fn listing_own_orders() {
        let service = create_service(5, 1).await;
        service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();
        service
            .create_order(alice(), checkout(&[(GADGET, 1)]))
            .await
            .unwrap();

        let mine = service.list_orders_for_user(alice(), ALICE).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|o| o.items_loaded()));

        let bobs = service
            .list_orders_for_user(Caller::customer(BOB), BOB)
            .await
            .unwrap();
        assert!(bobs.is_empty());
    }

    #[tokio::test]
    async fn listing_someone_elses_orders_is_forbidden() {
        let service = create_service(5, 1).await;

        let err = service
            .list_orders_for_user(Caller::customer(BOB), ALICE)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden { user_id: BOB }));

        assert!(service.list_orders_for_user(admin(), ALICE).await.is_ok());
    }

    #[tokio::test]
    async fn listing_all_orders_requires_admin() {
        let service = create_service(5, 1).await;
        service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        assert!(matches!(
            service.list_all_orders(alice()).await.unwrap_err(),
            DomainError::Forbidden { .. }
        ));
        assert_eq!(service.list_all_orders(admin()).await.unwrap().len(), 1);
    }
}

mod invoices {
    use super::*;

    #[tokio::test]
    async fn export_renders_visible_order() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 2)]))
            .await
            .unwrap();

        let document = service.export_invoice(alice(), order.id()).await.unwrap();

        assert_eq!(document.content_type, "text/plain");
        assert_eq!(document.file_name, format!("invoice-{}.txt", order.id()));
        assert_eq!(String::from_utf8(document.bytes).unwrap(), "Alice $22.00");
    }

    #[tokio::test]
    async fn export_hides_other_users_orders() {
        let service = create_service(5, 1).await;
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        let err = service
            .export_invoice(Caller::customer(BOB), order.id())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::NotFound(_))
        ));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_units_are_sold_exactly_once() {
        let service = Arc::new(create_service(3, 1).await);

        let attempts = (0..10).map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_order(
                        Caller::customer(UserId::new(i % 2 + 1)),
                        checkout(&[(WIDGET, 1)]),
                    )
                    .await
            })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 3);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| {
            matches!(e, DomainError::Order(OrderError::OutOfStock { .. }))
        }));
        assert_eq!(service.store().stock_of(WIDGET).await, Some(0));
        assert_eq!(service.store().order_count().await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_status_update_wins_once() {
        let service = Arc::new(create_service(5, 1).await);
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 1)]))
            .await
            .unwrap();

        let attempts = (0..2).map(|_| {
            let service = Arc::clone(&service);
            let order_id = order.id();
            tokio::spawn(async move {
                service
                    .update_status(admin(), order_id, OrderStatus::Paid)
                    .await
            })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| {
            matches!(e, DomainError::Order(OrderError::InvalidTransition { .. }))
        }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancellations_release_stock_once() {
        let service = Arc::new(create_service(5, 1).await);
        let order = service
            .create_order(alice(), checkout(&[(WIDGET, 2)]))
            .await
            .unwrap();

        let attempts = (0..4).map(|_| {
            let service = Arc::clone(&service);
            let order_id = order.id();
            tokio::spawn(async move { service.cancel_order(admin(), order_id).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(service.store().stock_of(WIDGET).await, Some(5));
    }
}
