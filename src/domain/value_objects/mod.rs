//! Value Objects for the checkout domain

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Self { Self(value) }
            pub fn get(self) -> i64 { self.0 }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self { Self(value) }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

id_type!(
    /// Catalog row id
    ProductId
);
id_type!(
    /// Order row id, assigned by the ledger
    OrderId
);
id_type!(
    /// Authenticated customer id supplied by the request layer
    UserId
);

/// Positive line quantity. Zero and negative values are unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Accepts only values in `1..=u32::MAX`.
    pub fn new(value: i64) -> Option<Self> {
        u32::try_from(value).ok().filter(|v| *v > 0).map(Self)
    }
    pub fn get(self) -> u32 { self.0 }

    /// Adds a signed delta; `None` when the result would not be a valid quantity.
    pub fn checked_add_signed(current: Option<Self>, delta: i64) -> Option<Self> {
        let base = current.map(|q| i64::from(q.0)).unwrap_or(0);
        base.checked_add(delta).and_then(Self::new)
    }

    pub fn as_decimal(self) -> Decimal { Decimal::from(self.0) }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::new(value).ok_or(QuantityError(value)) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct QuantityError(pub i64);
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "quantity must be positive, got {}", self.0) }
}

/// Discount percentage in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED { return Err(PercentageError(value)); }
        Ok(Self(value))
    }

    /// `amount * pct / 100`, unrounded.
    pub fn of(self, amount: Decimal) -> Decimal { amount * self.0 / Decimal::ONE_HUNDRED }
}

impl TryFrom<Decimal> for Percentage {
    type Error = PercentageError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Decimal { p.0 }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}%", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct PercentageError(pub Decimal);
impl std::error::Error for PercentageError {}
impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "percentage out of range: {}", self.0) }
}

/// Currency precision used for every charged amount.
pub const CURRENCY_SCALE: u32 = 2;

/// Rounds to currency precision, half away from zero. The result always
/// carries exactly two decimal places.
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// How the customer intends to pay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self { Self::CreditCard => "credit_card", Self::Paypal => "paypal" }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(Self::CreditCard),
            "paypal" => Ok(Self::Paypal),
            other => Err(UnknownPaymentMethod(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownPaymentMethod(pub String);
impl std::error::Error for UnknownPaymentMethod {}
impl fmt::Display for UnknownPaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown payment method: {}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_rejects_non_positive() {
        assert!(Quantity::new(0).is_none());
        assert!(Quantity::new(-3).is_none());
        assert_eq!(Quantity::new(4).unwrap().get(), 4);
        assert!(Quantity::new(i64::from(u32::MAX) + 1).is_none());
    }

    #[test]
    fn test_quantity_signed_add() {
        let two = Quantity::new(2);
        assert_eq!(Quantity::checked_add_signed(two, 3), Quantity::new(5));
        assert_eq!(Quantity::checked_add_signed(None, 1), Quantity::new(1));
        assert_eq!(Quantity::checked_add_signed(two, -2), None);
        assert_eq!(Quantity::checked_add_signed(two, i64::MAX), None);
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(Decimal::new(-1, 0)).is_err());
        assert!(Percentage::new(Decimal::new(101, 0)).is_err());
        let ten = Percentage::new(Decimal::new(10, 0)).unwrap();
        assert_eq!(ten.of(Decimal::new(19995, 3)), Decimal::new(19995, 4));
    }

    #[test]
    fn test_round_currency_half_away_from_zero() {
        assert_eq!(round_currency(Decimal::new(17_9955, 4)), Decimal::new(1800, 2));
        assert_eq!(round_currency(Decimal::new(2_345, 3)), Decimal::new(235, 2));
        assert_eq!(round_currency(Decimal::new(-2_345, 3)), Decimal::new(-235, 2));
        assert_eq!(round_currency(Decimal::from(18)).to_string(), "18.00");
    }

    #[test]
    fn test_payment_method_round_trip_str() {
        assert_eq!("paypal".parse::<PaymentMethod>().unwrap(), PaymentMethod::Paypal);
        assert_eq!(PaymentMethod::CreditCard.to_string(), "credit_card");
        assert!("cash".parse::<PaymentMethod>().is_err());
    }
}
