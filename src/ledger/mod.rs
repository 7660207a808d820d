//! Order ledger: the transactional store behind checkout.
//!
//! A [`LedgerTransaction`] is the only way to write. Reads through it take
//! row locks that are held until `commit` or `rollback`, which is what keeps
//! two checkouts from selling the same unit of stock. Dropping a transaction
//! without committing rolls it back.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::domain::aggregates::{NewOrder, Order, OrderItem, OrderStatus, Product};
use crate::domain::value_objects::{OrderId, ProductId, Quantity};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Lock wait expired or the database aborted us for a conflict.
    #[error("lock wait timed out or transaction conflicted")]
    Busy,

    /// A guard or constraint refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait OrderLedger: Catalog {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError>;
}

#[async_trait]
pub trait LedgerTransaction: Send {
    /// Locking read; the row stays locked for the rest of the transaction.
    async fn fetch_product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, LedgerError>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, LedgerError>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), LedgerError>;

    /// Fails with `Rejected` rather than letting stock go below zero.
    async fn decrement_stock(&mut self, id: ProductId, amount: Quantity) -> Result<(), LedgerError>;

    async fn increment_stock(&mut self, id: ProductId, amount: Quantity) -> Result<(), LedgerError>;

    /// Locking read of an order row.
    async fn fetch_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, LedgerError>;

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>, LedgerError>;

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}
