//! HTTP API server for order processing.
//!
//! Provides REST endpoints for checkout, order lookup, status changes,
//! invoices and dashboard statistics, with structured logging (tracing)
//! and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod invoice;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{OrderBackend, OrderService, OrderStatistics};
use metrics_exporter_prometheus::PrometheusHandle;
use reporting::DashboardReport;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::Authenticator;
use invoice::TextInvoiceRenderer;

/// A store able to serve every endpoint.
pub trait AppStore: OrderBackend + OrderStatistics + Clone + 'static {}

impl<T> AppStore for T where T: OrderBackend + OrderStatistics + Clone + 'static {}

/// Shared application state accessible from all handlers.
pub struct AppState<S: AppStore> {
    pub orders: OrderService<S>,
    pub dashboard: DashboardReport<S>,
    pub auth: Arc<dyn Authenticator>,
}

/// Wires the order service and dashboard over one store.
pub fn create_state<S: AppStore>(store: S, auth: Arc<dyn Authenticator>) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orders: OrderService::new(store.clone(), Arc::new(TextInvoiceRenderer)),
        dashboard: DashboardReport::new(store),
        auth,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: AppStore>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list_all::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).delete(routes::orders::cancel::<S>),
        )
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .route("/orders/{id}/invoice", get(routes::orders::invoice::<S>))
        .route("/user-orders", get(routes::orders::list_own::<S>))
        .route("/order-stats", get(routes::stats::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
