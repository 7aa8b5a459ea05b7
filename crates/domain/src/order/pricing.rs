//! Cart pricing.
//!
//! Pure computation over the submitted cart and the catalog's current
//! prices. Client-supplied prices are never consulted.

use std::collections::{BTreeMap, HashMap};

use common::ProductId;
use serde::{Deserialize, Serialize};

use super::{CartError, Money, OrderItem, OrderTotals, ProductSnapshot};

/// One requested `(product, quantity)` line as submitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    /// Signed so that non-positive quantities can be reported, not coerced.
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Result of pricing a cart: the order lines and their totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    /// One item per distinct product, ordered by product ID.
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
}

/// Prices `lines` against `catalog`.
///
/// Lines for the same product are merged. Fails on an empty cart, a
/// non-positive quantity, a product absent from `catalog`, a negative
/// shipping or tax amount, or totals that overflow.
pub fn price_cart(
    lines: &[CartLine],
    catalog: &[ProductSnapshot],
    shipping_price: Money,
    tax_price: Money,
) -> Result<PricedCart, CartError> {
    if lines.is_empty() {
        return Err(CartError::Empty);
    }
    if shipping_price.is_negative() {
        return Err(CartError::NegativeCharge {
            field: "shipping_price",
            amount: shipping_price,
        });
    }
    if tax_price.is_negative() {
        return Err(CartError::NegativeCharge {
            field: "tax_price",
            amount: tax_price,
        });
    }

    let mut quantities: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in lines {
        let quantity = u32::try_from(line.quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(CartError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            })?;
        let merged = quantities.entry(line.product_id).or_insert(0);
        *merged = merged
            .checked_add(quantity)
            .ok_or(CartError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            })?;
    }

    let by_id: HashMap<ProductId, &ProductSnapshot> =
        catalog.iter().map(|p| (p.product_id, p)).collect();

    let items = quantities
        .into_iter()
        .map(|(product_id, quantity)| {
            by_id
                .get(&product_id)
                .map(|product| OrderItem::from_snapshot(product, quantity))
                .ok_or(CartError::UnknownProduct { product_id })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut products_price = Money::zero();
    let mut products_discount_price = Money::zero();
    for item in &items {
        let line = item.checked_line_price().ok_or(CartError::AmountTooLarge)?;
        products_price = products_price
            .checked_add(line)
            .ok_or(CartError::AmountTooLarge)?;
        products_discount_price = products_discount_price
            .checked_add(line.percent(item.discount))
            .ok_or(CartError::AmountTooLarge)?;
    }

    let totals = OrderTotals::checked_new(
        products_price,
        products_discount_price,
        shipping_price,
        tax_price,
    )
    .ok_or(CartError::AmountTooLarge)?;

    Ok(PricedCart { items, totals })
}

/// Distinct product IDs referenced by a cart, in ascending order.
pub(crate) fn referenced_products(lines: &[CartLine]) -> Vec<ProductId> {
    let mut ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
