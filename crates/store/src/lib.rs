//! Stores backing the order core.
//!
//! Both implementations provide every port the order service needs:
//! product catalog and stock, order persistence, statistics and users.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
