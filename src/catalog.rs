//! Catalog reader: non-locking reads of products and discount codes.
//!
//! Every call goes to the backing store; nothing here caches, so prices and
//! stock always reflect the last committed state.

use async_trait::async_trait;

use crate::domain::aggregates::{DiscountCode, Product};
use crate::domain::value_objects::ProductId;
use crate::ledger::LedgerError;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// `Ok(None)` when the product does not exist.
    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, LedgerError>;

    /// All products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>, LedgerError>;

    /// Exact, case-sensitive code lookup.
    async fn fetch_discount(&self, code: &str) -> Result<Option<DiscountCode>, LedgerError>;
}
