//! Cart Aggregate
//!
//! A cart is plain session state: product ids with quantities plus an optional
//! discount. It never caches prices; anything price- or stock-related is read
//! from the catalog by the services layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{Percentage, ProductId, Quantity};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    discount: Option<Percentage>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Lines in insertion order.
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line_count(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn discount(&self) -> Option<Percentage> { self.discount }
    pub fn updated_at(&self) -> Option<DateTime<Utc>> { self.updated_at }

    pub fn quantity_of(&self, product_id: ProductId) -> Option<Quantity> {
        self.lines.iter().find(|l| l.product_id == product_id).map(|l| l.quantity)
    }

    /// Stores `quantity` as the line's quantity, appending a new line if needed.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: Quantity) {
        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = quantity,
            None => self.lines.push(CartLine { product_id, quantity }),
        }
        self.touch();
    }

    pub fn set_discount(&mut self, pct: Percentage) { self.discount = Some(pct); self.touch(); }
    pub fn clear_discount(&mut self) { self.discount = None; self.touch(); }

    /// Drops every line and the discount. Calling it on an empty cart is a no-op.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.discount = None;
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Some(Utc::now()); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn qty(n: i64) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        cart.set_quantity(ProductId::new(1), qty(2));
        cart.set_quantity(ProductId::new(2), qty(1));
        cart.set_quantity(ProductId::new(1), qty(5));
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.lines()[0].product_id, ProductId::new(1)); // order kept
        assert_eq!(cart.quantity_of(ProductId::new(1)), Some(qty(5)));
        assert_eq!(cart.quantity_of(ProductId::new(3)), None);
        assert!(cart.updated_at().is_some());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cart = Cart::new();
        cart.set_quantity(ProductId::new(3), qty(1));
        cart.set_discount(Percentage::new(Decimal::new(15, 0)).unwrap());
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.discount(), None);
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.discount(), None);
    }

    #[test]
    fn test_serde_round_trip_for_session_storage() {
        let mut cart = Cart::new();
        cart.set_quantity(ProductId::new(9), qty(4));
        let json = serde_json::to_string(&cart).unwrap();
        let back: Cart = serde_json::from_str(&json).unwrap();
        assert_eq!(back.quantity_of(ProductId::new(9)), Some(qty(4)));
    }
}
