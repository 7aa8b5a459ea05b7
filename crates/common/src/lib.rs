//! Shared types for the order-processing workspace.

mod types;

pub use types::{OrderId, ProductId, UserId};
