//! Checkout coordinator
//!
//! A checkout is one ledger transaction: locked stock re-verification, order
//! insert, then one item insert and one stock decrement per cart line. Any
//! failure rolls the whole transaction back and leaves the cart as it was.
//! The cart is only cleared once the commit has been confirmed.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::pricing::discounted_total;
use super::Storefront;
use crate::domain::aggregates::{Cart, CartLine, NewOrder, OrderItem, OrderStatus, Product};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{OrderId, PaymentMethod, ProductId, Quantity, UserId};
use crate::ledger::{LedgerError, LedgerTransaction};
use crate::{Result, ShopError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    Validating,
    Committing,
    Committed,
    RolledBack,
}

impl CheckoutState {
    pub fn can_advance_to(self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Idle, Validating) | (Validating, Committing) | (Committing, Committed) | (Committing, RolledBack)
        )
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Result of a committed checkout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub total: Decimal,
    pub event: OrderEvent,
}

struct Attempt {
    state: CheckoutState,
}

impl Attempt {
    fn start() -> Self { Self { state: CheckoutState::Idle } }

    fn advance(&mut self, next: CheckoutState) {
        debug_assert!(self.state.can_advance_to(next), "{} -> {}", self.state, next);
        debug!(from = %self.state, to = %next, "checkout state");
        self.state = next;
    }
}

/// Busy passes through unchanged so callers can still retry.
fn step_failure(err: LedgerError, wrap: impl FnOnce(LedgerError) -> ShopError) -> ShopError {
    match err {
        LedgerError::Busy => ShopError::Busy,
        other => wrap(other),
    }
}

async fn abort(tx: Box<dyn LedgerTransaction>, attempt: &mut Attempt, err: &ShopError) {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "rollback failed; transaction discarded");
    }
    attempt.advance(CheckoutState::RolledBack);
    warn!(error = %err, "checkout rolled back");
}

impl Storefront {
    /// Places an order for everything in `cart`.
    ///
    /// On success the cart and its discount are cleared. On failure the
    /// ledger is untouched and so is the cart.
    #[instrument(skip(self, cart), fields(lines = cart.line_count()))]
    pub async fn checkout(&self, cart: &mut Cart, user_id: UserId, payment_method: PaymentMethod) -> Result<CheckoutReceipt> {
        let mut attempt = Attempt::start();
        attempt.advance(CheckoutState::Validating);

        if cart.is_empty() {
            return Err(ShopError::EmptyCart);
        }
        if self.final_total(cart).await? <= Decimal::ZERO {
            return Err(ShopError::ZeroTotal);
        }
        let lines = cart.lines().to_vec();
        let discount = cart.discount();

        attempt.advance(CheckoutState::Committing);
        let mut tx = self.ledger.begin().await?;

        let placed: Result<(OrderId, Decimal)> = async {
            let locked = verify_stock(tx.as_mut(), &lines).await?;
            let subtotal: Decimal = locked.iter().map(|(product, qty)| product.line_total(*qty)).sum();
            let total = discounted_total(subtotal, discount);
            if total <= Decimal::ZERO {
                return Err(ShopError::ZeroTotal);
            }

            let order_id = tx
                .insert_order(&NewOrder::pending(user_id, total, payment_method))
                .await
                .map_err(|e| step_failure(e, ShopError::OrderInsertFailed))?;

            for line in &lines {
                let product_id = line.product_id;
                tx.insert_order_item(&OrderItem { order_id, product_id, quantity: line.quantity })
                    .await
                    .map_err(|e| step_failure(e, |source| ShopError::OrderItemFailed { product_id, source }))?;
                tx.decrement_stock(product_id, line.quantity)
                    .await
                    .map_err(|e| step_failure(e, |source| ShopError::StockUpdateFailed { product_id, source }))?;
            }
            Ok((order_id, total))
        }
        .await;

        let (order_id, total) = match placed {
            Ok(placed) => placed,
            Err(err) => {
                abort(tx, &mut attempt, &err).await;
                return Err(err);
            }
        };

        if let Err(err) = tx.commit().await {
            attempt.advance(CheckoutState::RolledBack);
            warn!(error = %err, "checkout commit failed");
            return Err(err.into());
        }
        attempt.advance(CheckoutState::Committed);

        cart.clear();
        info!(%order_id, %user_id, %total, "order placed");

        let items = lines.iter().map(|l| (l.product_id, l.quantity)).collect();
        Ok(CheckoutReceipt {
            order_id,
            total,
            event: OrderEvent::Placed { order_id, user_id, total, payment_method, items },
        })
    }

    /// Compensating transaction for a committed checkout: restocks every
    /// ordered line and marks the order cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<OrderEvent> {
        let mut tx = self.ledger.begin().await?;
        let restocked = match restock_order(tx.as_mut(), order_id).await {
            Ok(restocked) => restocked,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; transaction discarded");
                }
                warn!(error = %err, "cancellation rolled back");
                return Err(err);
            }
        };
        tx.commit().await?;
        info!(%order_id, lines = restocked.len(), "order cancelled");
        Ok(OrderEvent::Cancelled { order_id, restocked })
    }
}

/// Locking read of every line, in cart order.
async fn verify_stock(tx: &mut dyn LedgerTransaction, lines: &[CartLine]) -> Result<Vec<(Product, Quantity)>> {
    let mut locked = Vec::with_capacity(lines.len());
    for line in lines {
        let product = tx.fetch_product_for_update(line.product_id).await?;
        let requested = i64::from(line.quantity.get());
        match product {
            Some(p) if p.can_supply(line.quantity) => locked.push((p, line.quantity)),
            Some(p) => {
                return Err(ShopError::InsufficientStock { product_id: line.product_id, available: p.stock, requested })
            }
            None => return Err(ShopError::InsufficientStock { product_id: line.product_id, available: 0, requested }),
        }
    }
    Ok(locked)
}

async fn restock_order(tx: &mut dyn LedgerTransaction, order_id: OrderId) -> Result<Vec<(ProductId, Quantity)>> {
    let order = tx.fetch_order_for_update(order_id).await?.ok_or(ShopError::OrderNotFound(order_id))?;
    if !order.is_cancellable() {
        return Err(ShopError::OrderNotCancellable { order_id, status: order.status });
    }

    let mut restocked = Vec::new();
    for item in tx.order_items(order_id).await? {
        if tx.fetch_product_for_update(item.product_id).await?.is_none() {
            warn!(product_id = %item.product_id, "ordered product no longer exists, not restocked");
            continue;
        }
        tx.increment_stock(item.product_id, item.quantity).await?;
        restocked.push((item.product_id, item.quantity));
    }
    tx.set_order_status(order_id, OrderStatus::Cancelled).await?;
    Ok(restocked)
}
