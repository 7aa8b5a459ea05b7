//! Value objects for the order domain.

use common::ProductId;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Converts a decimal amount into money.
    ///
    /// Returns `None` when the amount carries more than two fractional
    /// digits or does not fit in the cent range.
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let normalized = amount.normalize();
        if normalized.scale() > 2 {
            return None;
        }
        let cents = normalized.checked_mul(Decimal::ONE_HUNDRED)?.to_i64()?;
        Some(Self { cents })
    }

    /// Returns the amount as a decimal with two fractional digits.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.cents, 2)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, saturating at the representable range.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Returns the given percentage of this amount, rounded half-up to the cent.
    pub fn percent(&self, discount: Discount) -> Money {
        let cents = self.cents;
        let pct = i64::from(discount.percent());
        // Split so that `cents * pct` cannot overflow.
        let whole = (cents / 100) * pct;
        let part = div_round_half_up((cents % 100) * pct, 100);
        Money {
            cents: whole + part,
        }
    }

    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.cents.checked_sub(other.cents).map(Money::from_cents)
    }

    /// Divides the amount evenly, rounding half-up to the cent.
    ///
    /// Returns zero when `divisor` is zero.
    pub fn divide(&self, divisor: u64) -> Money {
        let Ok(divisor) = i64::try_from(divisor) else {
            return Money::zero();
        };
        if divisor == 0 {
            return Money::zero();
        }
        Money {
            cents: div_round_half_up(self.cents, divisor),
        }
    }
}

fn div_round_half_up(value: i64, divisor: i64) -> i64 {
    let quotient = value / divisor;
    let remainder = value % divisor;
    if remainder.unsigned_abs() * 2 >= divisor.unsigned_abs() {
        quotient + value.signum()
    } else {
        quotient
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Whole-percentage discount applied to a product's unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Discount(u8);

impl Discount {
    /// Creates a discount, returning `None` above 100%.
    pub fn new(percent: u8) -> Option<Self> {
        (percent <= 100).then_some(Self(percent))
    }

    /// No discount.
    pub fn none() -> Self {
        Self(0)
    }

    /// Returns the percentage (0..=100).
    pub fn percent(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Discount {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Discount::new(value).ok_or_else(|| format!("discount {value}% exceeds 100%"))
    }
}

impl From<Discount> for u8 {
    fn from(discount: Discount) -> Self {
        discount.0
    }
}

impl std::fmt::Display for Discount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Authoritative product data read from the catalog at checkout time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub discount: Discount,
}

impl ProductSnapshot {
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Money,
        discount: Discount,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            discount,
        }
    }
}

/// A purchased line, carrying a snapshot of the product as it was sold.
///
/// Never re-read from the live product after the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name at the time of purchase.
    pub product_name: String,

    /// Quantity ordered (always at least 1).
    pub quantity: u32,

    /// Unit price at the time of purchase.
    pub unit_price: Money,

    /// Discount at the time of purchase.
    pub discount: Discount,
}

impl OrderItem {
    /// Creates an order item from a catalog snapshot.
    pub fn from_snapshot(product: &ProductSnapshot, quantity: u32) -> Self {
        Self {
            product_id: product.product_id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.unit_price,
            discount: product.discount,
        }
    }

    /// Price of the line before discount (quantity * unit_price).
    pub fn line_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Line price, or `None` if it does not fit in the cent range.
    pub fn checked_line_price(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }

    /// Discount amount for the whole line.
    pub fn line_discount(&self) -> Money {
        self.line_price().percent(self.discount)
    }
}
