use serde::{Deserialize, Serialize};

/// Identifier of a persisted order.
///
/// Orders are keyed by the store's sequence, so the identifier is only
/// known after the order has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Creates an order ID from its raw key.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw key.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a user account owned by the user subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Creates a user ID from its raw key.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw key.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    /// Creates a product ID from its raw key.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw key.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_preserve_raw_value() {
        assert_eq!(OrderId::new(42).as_i64(), 42);
        assert_eq!(UserId::from(7).as_i64(), 7);
        assert_eq!(ProductId::new(3).to_string(), "3");
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&ProductId::new(7)).unwrap();
        assert_eq!(json, "7");

        let id: OrderId = serde_json::from_str("19").unwrap();
        assert_eq!(id, OrderId::new(19));
    }

    #[test]
    fn ids_order_by_raw_key() {
        assert!(ProductId::new(1) < ProductId::new(2));
    }
}
