//! Read-only reporting over the order collection.
//!
//! This crate provides:
//! - [`MonthWindow`] for calendar-month time windows
//! - [`DashboardReport`], which computes a [`RevenueSnapshot`] on demand

pub mod dashboard;
pub mod error;
pub mod window;

pub use dashboard::{DashboardReport, RevenueSnapshot};
pub use error::{ReportingError, Result};
pub use window::MonthWindow;
