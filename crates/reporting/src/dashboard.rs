//! Dashboard statistics over orders and users.

use std::time::Instant;

use chrono::{DateTime, Utc};
use domain::{Money, OrderStatistics, OrderStatus, UserDirectory};

use crate::{MonthWindow, Result};

/// Summary statistics for the admin dashboard. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueSnapshot {
    /// Orders in any status.
    pub order_count: u64,
    /// Revenue from orders created in the previous calendar month.
    pub revenue_last_month: Money,
    pub revenue_last_month_name: &'static str,
    pub revenue_all_time: Money,
    /// `revenue_all_time / order_count`, zero when there are no orders.
    pub average_revenue: Money,
    pub user_count: u64,
}

/// Computes [`RevenueSnapshot`]s from a statistics source.
///
/// Every call issues fresh read queries; results are not cached.
pub struct DashboardReport<Q> {
    source: Q,
}

impl<Q> DashboardReport<Q>
where
    Q: OrderStatistics + UserDirectory,
{
    pub fn new(source: Q) -> Self {
        Self { source }
    }

    /// Computes the dashboard as of `now`.
    ///
    /// Revenue counts only `Paid` and `Delivered` orders.
    #[tracing::instrument(skip(self))]
    pub async fn compute(&self, now: DateTime<Utc>) -> Result<RevenueSnapshot> {
        let started = Instant::now();
        let last_month = MonthWindow::previous(now)?;

        let (order_count, revenue_last_month, revenue_all_time, user_count) = tokio::try_join!(
            self.source.count_orders(),
            self.source
                .sum_revenue(&OrderStatus::REVENUE, Some(last_month.range())),
            self.source.sum_revenue(&OrderStatus::REVENUE, None),
            self.source.count_users(),
        )?;

        let snapshot = RevenueSnapshot {
            order_count,
            revenue_last_month,
            revenue_last_month_name: last_month.name(),
            revenue_all_time,
            average_revenue: revenue_all_time.divide(order_count),
            user_count,
        };

        metrics::histogram!("dashboard_report_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(
            order_count,
            user_count,
            revenue_all_time = %snapshot.revenue_all_time,
            "dashboard computed"
        );

        Ok(snapshot)
    }
}
