//! Product Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{ProductId, Quantity};

/// Catalog row as the checkout core sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub stock: u32,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, unit_price: Decimal, stock: u32) -> Self {
        Self { id, name: name.into(), unit_price, stock }
    }

    pub fn can_supply(&self, qty: Quantity) -> bool { self.stock >= qty.get() }
    pub fn line_total(&self, qty: Quantity) -> Decimal { self.unit_price * qty.as_decimal() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_can_supply_whole_line() {
        let p = Product::new(ProductId::new(7), "Widget", Decimal::new(1000, 2), 5);
        assert!(p.can_supply(Quantity::new(5).unwrap()));
        assert!(!p.can_supply(Quantity::new(6).unwrap()));
    }
    #[test]
    fn test_line_total() {
        let p = Product::new(ProductId::new(1), "A", Decimal::new(6665, 3), 10);
        assert_eq!(p.line_total(Quantity::new(3).unwrap()), Decimal::new(19995, 3));
    }
}
