//! HTTP route handlers.

pub mod orders;
pub mod stats;
pub mod system;
