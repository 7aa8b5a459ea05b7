//! Admin dashboard statistics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use reporting::RevenueSnapshot;
use serde::Serialize;

use super::orders::money;
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::{AppState, AppStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub order_count: u64,
    pub revenue_last_month: String,
    pub revenue_last_month_name: &'static str,
    pub revenue_all_time: String,
    pub average_revenue: String,
    pub user_count: u64,
}

impl From<RevenueSnapshot> for StatsResponse {
    fn from(snapshot: RevenueSnapshot) -> Self {
        Self {
            order_count: snapshot.order_count,
            revenue_last_month: money(snapshot.revenue_last_month),
            revenue_last_month_name: snapshot.revenue_last_month_name,
            revenue_all_time: money(snapshot.revenue_all_time),
            average_revenue: money(snapshot.average_revenue),
            user_count: snapshot.user_count,
        }
    }
}

/// GET /order-stats: dashboard aggregates, computed per request.
#[tracing::instrument(skip(state))]
pub async fn get<S: AppStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(caller): Authenticated,
) -> Result<Json<StatsResponse>, ApiError> {
    caller.require_admin()?;
    let snapshot = state.dashboard.compute(Utc::now()).await?;
    Ok(Json(snapshot.into()))
}
