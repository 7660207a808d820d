//! Cart store operations that need the catalog.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use super::Storefront;
use crate::domain::aggregates::{Cart, Product};
use crate::domain::value_objects::{ProductId, Quantity};
use crate::{Result, ShopError};

/// One cart line joined with its current catalog row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartEntry {
    pub product: Product,
    pub quantity: Quantity,
    pub subtotal: Decimal,
}

impl Storefront {
    /// Adds `quantity` units to the product's line and returns the new line quantity.
    ///
    /// The cart is left untouched on any error. Stock is read fresh and must
    /// cover the whole resulting line, not just the added units.
    #[instrument(skip(self, cart))]
    pub async fn add_to_cart(&self, cart: &mut Cart, product_id: ProductId, quantity: i64) -> Result<Quantity> {
        if quantity <= 0 {
            return Err(ShopError::InvalidQuantity(quantity));
        }
        let new_quantity = Quantity::checked_add_signed(cart.quantity_of(product_id), quantity)
            .ok_or(ShopError::InvalidQuantity(quantity))?;

        let product = self.ledger.fetch_product(product_id).await?.ok_or(ShopError::ProductNotFound(product_id))?;
        if !product.can_supply(new_quantity) {
            return Err(ShopError::InsufficientStock {
                product_id,
                available: product.stock,
                requested: i64::from(new_quantity.get()),
            });
        }

        cart.set_quantity(product_id, new_quantity);
        debug!(%product_id, quantity = new_quantity.get(), "cart line updated");
        Ok(new_quantity)
    }

    pub fn clear_cart(&self, cart: &mut Cart) {
        cart.clear();
    }

    /// Current catalog view of the cart. Lines whose product disappeared are skipped.
    pub async fn cart_contents(&self, cart: &Cart) -> Result<Vec<CartEntry>> {
        let mut entries = Vec::with_capacity(cart.line_count());
        for line in cart.lines() {
            let Some(product) = self.ledger.fetch_product(line.product_id).await? else {
                debug!(product_id = %line.product_id, "skipping cart line for missing product");
                continue;
            };
            let subtotal = product.line_total(line.quantity);
            entries.push(CartEntry { product, quantity: line.quantity, subtotal });
        }
        Ok(entries)
    }
}
