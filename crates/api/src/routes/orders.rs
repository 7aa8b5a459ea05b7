//! Order checkout, lookup, status and invoice endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use domain::{
    CartLine, CheckoutRequest, Money, Order, OrderDetails, OrderItem, OrderStatus, UserSummary,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::{AppState, AppStore};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub cart_items: Vec<CartItemRequest>,
    /// Accepts a JSON number or a decimal string.
    #[serde(default)]
    pub shipping_price: Decimal,
    #[serde(default)]
    pub tax_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product_id: ProductId,
    pub qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

/// Money is rendered as a decimal string with two places, e.g. `"22.00"`.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub products_price: String,
    pub products_discount_price: String,
    pub shipping_price: String,
    pub tax_price: String,
    pub total_price: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub discount: u8,
    pub line_total: String,
}

pub(crate) fn money(amount: Money) -> String {
    amount.to_decimal().to_string()
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: money(item.unit_price),
            discount: item.discount.percent(),
            line_total: money(item.line_price() - item.line_discount()),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let totals = order.totals();
        Self {
            id: order.id(),
            user_id: order.user_id(),
            status: order.status(),
            products_price: money(totals.products_price()),
            products_discount_price: money(totals.products_discount_price()),
            shipping_price: money(totals.shipping_price()),
            tax_price: money(totals.tax_price()),
            total_price: money(totals.total_price()),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
            items: order
                .items_loaded()
                .then(|| order.items().iter().map(OrderItemResponse::from).collect()),
            user: None,
        }
    }
}

impl From<OrderDetails> for OrderResponse {
    fn from(details: OrderDetails) -> Self {
        Self {
            user: details.user,
            ..Self::from(&details.order)
        }
    }
}

fn order_id(path: Result<Path<OrderId>, PathRejection>) -> Result<OrderId, ApiError> {
    let Path(id) = path?;
    Ok(id)
}

fn money_field(field: &str, amount: Decimal) -> Result<Money, ApiError> {
    Money::from_decimal(amount).ok_or_else(|| {
        ApiError::Unprocessable(format!(
            "Invalid {field}: {amount} (at most two decimal places)"
        ))
    })
}

// -- Handlers --

/// POST /orders: check out a cart as the calling user.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(req) = payload?;

    let request = CheckoutRequest {
        lines: req
            .cart_items
            .iter()
            .map(|line| CartLine::new(line.product_id, line.qty))
            .collect(),
        shipping_price: money_field("shipping_price", req.shipping_price)?,
        tax_price: money_field("tax_price", req.tax_price)?,
    };

    let order = state.orders.create_order(caller, request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}: one order with its items and owner.
#[tracing::instrument(skip(state, path))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
    path: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = order_id(path)?;
    let details = state.orders.get_order(caller, id).await?;
    Ok(Json(OrderResponse::from(details)))
}

/// GET /orders: every order, newest first (administrators only).
#[tracing::instrument(skip(state))]
pub async fn list_all<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_all_orders(caller).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /user-orders: the calling user's orders with items.
#[tracing::instrument(skip(state))]
pub async fn list_own<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .orders
        .list_orders_for_user(caller, caller.user_id)
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// PATCH /orders/{id}/status: move an order along its lifecycle.
#[tracing::instrument(skip(state, path, payload))]
pub async fn update_status<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
    path: Result<Path<OrderId>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = order_id(path)?;
    let Json(req) = payload?;
    let target: OrderStatus = req
        .status
        .parse()
        .map_err(|e: domain::UnknownStatus| ApiError::Unprocessable(e.to_string()))?;

    let order = state.orders.update_status(caller, id, target).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/{id}: cancel an order and return its stock.
#[tracing::instrument(skip(state, path))]
pub async fn cancel<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
    path: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = order_id(path)?;
    let order = state.orders.cancel_order(caller, id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/{id}/invoice: download the rendered invoice.
#[tracing::instrument(skip(state, path))]
pub async fn invoice<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
    path: Result<Path<OrderId>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = order_id(path)?;
    let document = state.orders.export_invoice(caller, id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
        ],
        document.bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Discount, NewOrder, OrderTotals, ProductSnapshot};

    #[test]
    fn test_order_response_renders_money_as_strings() {
        let product = ProductSnapshot::new(
            ProductId::new(7),
            "Widget",
            Money::from_cents(1000),
            Discount::new(10).unwrap(),
        );
        let item = OrderItem::from_snapshot(&product, 2);
        let order = Order::placed(
            OrderId::new(1),
            NewOrder {
                user_id: UserId::new(3),
                totals: OrderTotals::new(
                    item.line_price(),
                    item.line_discount(),
                    Money::from_cents(300),
                    Money::from_cents(100),
                ),
                items: vec![item],
                created_at: Utc::now(),
            },
        );

        let json = serde_json::to_value(OrderResponse::from(&order)).unwrap();

        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["products_price"], "20.00");
        assert_eq!(json["products_discount_price"], "2.00");
        assert_eq!(json["total_price"], "22.00");
        assert_eq!(json["items"][0]["line_total"], "18.00");
        assert_eq!(json["items"][0]["discount"], 10);
        assert!(json.get("user").is_none());
    }

    #[test]
    fn test_money_field_rejects_sub_cent_precision() {
        assert_eq!(
            money_field("tax_price", Decimal::new(150, 2)).unwrap(),
            Money::from_cents(150)
        );
        assert!(money_field("tax_price", Decimal::new(1505, 3)).is_err());
    }
}
