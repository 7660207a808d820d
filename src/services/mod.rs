//! Storefront services: cart store, pricing engine and checkout coordinator.
//!
//! All operations live on [`Storefront`] and take the session's [`Cart`]
//! explicitly; loading and saving that cart is the request layer's job.
//!
//! [`Cart`]: crate::domain::aggregates::Cart

use std::sync::Arc;

use crate::domain::aggregates::Product;
use crate::domain::value_objects::ProductId;
use crate::ledger::OrderLedger;
use crate::{Result, ShopError};

pub mod cart;
pub mod checkout;
pub mod pricing;

pub use cart::CartEntry;
pub use checkout::{CheckoutReceipt, CheckoutState};
pub use pricing::discounted_total;

#[derive(Clone)]
pub struct Storefront {
    ledger: Arc<dyn OrderLedger>,
}

impl Storefront {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self { Self { ledger } }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.ledger.list_products().await?)
    }

    pub async fn product(&self, id: ProductId) -> Result<Product> {
        self.ledger.fetch_product(id).await?.ok_or(ShopError::ProductNotFound(id))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::ledger::MemoryLedger;
    use rust_decimal::Decimal;

    /// `(id, unit price in cents, stock)`
    pub async fn shop_with(products: &[(i64, i64, u32)]) -> (Storefront, MemoryLedger) {
        let ledger = MemoryLedger::default();
        for (id, cents, stock) in products {
            ledger.insert_product(Product::new(ProductId::new(*id), format!("Product {}", id), Decimal::new(*cents, 2), *stock)).await;
        }
        (Storefront::new(Arc::new(ledger.clone())), ledger)
    }
}
