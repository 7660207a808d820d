//! Storefront checkout core
//!
//! Session-scoped carts, discount pricing and an atomic checkout protocol
//! against an order ledger.
//!
//! ## Features
//! - Catalog reads with fresh prices and stock
//! - Cart mutations validated against live stock
//! - Discount codes with strict expiry
//! - Checkout as one ledger transaction with locked stock re-verification
//! - Order cancellation as a compensating transaction

pub mod catalog;
pub mod config;
pub mod domain;
pub mod http;
pub mod ledger;
pub mod services;

pub use catalog::Catalog;
pub use domain::aggregates::{Cart, CartLine, DiscountCode, Order, OrderItem, OrderStatus, Product};
pub use domain::events::OrderEvent;
pub use domain::value_objects::{OrderId, PaymentMethod, Percentage, ProductId, Quantity, UserId};
pub use ledger::{LedgerError, LedgerTransaction, OrderLedger};
pub use services::{CartEntry, CheckoutReceipt, CheckoutState, Storefront};

use chrono::NaiveDate;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    #[error("Discount code not found")]
    DiscountCodeNotFound,

    #[error("Discount code expired on {expires}")]
    DiscountCodeExpired { expires: NaiveDate },

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock { product_id: ProductId, available: u32, requested: i64 },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart total is zero")]
    ZeroTotal,

    #[error("Invalid quantity {0}")]
    InvalidQuantity(i64),

    #[error("Order insert failed")]
    OrderInsertFailed(#[source] LedgerError),

    #[error("Order item insert failed for product {product_id}")]
    OrderItemFailed { product_id: ProductId, #[source] source: LedgerError },

    #[error("Stock update failed for product {product_id}")]
    StockUpdateFailed { product_id: ProductId, #[source] source: LedgerError },

    #[error("Order {order_id} cannot be cancelled in status {status}")]
    OrderNotCancellable { order_id: OrderId, status: OrderStatus },

    #[error("Ledger busy, retry later")]
    Busy,

    #[error("Ledger error: {0}")]
    Ledger(#[source] LedgerError),
}

impl ShopError {
    /// Lock contention is the only failure a plain retry can fix.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Busy) }
}

impl From<LedgerError> for ShopError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Busy => ShopError::Busy,
            other => ShopError::Ledger(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
