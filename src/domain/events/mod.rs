//! Domain events, emitted only after the owning transaction committed
use crate::domain::value_objects::{OrderId, PaymentMethod, ProductId, Quantity, UserId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed {
        order_id: OrderId,
        user_id: UserId,
        total: Decimal,
        payment_method: PaymentMethod,
        items: Vec<(ProductId, Quantity)>,
    },
    Cancelled {
        order_id: OrderId,
        restocked: Vec<(ProductId, Quantity)>,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self { Self::Placed { order_id, .. } | Self::Cancelled { order_id, .. } => *order_id }
    }

    /// Message subject the event is published under.
    pub fn subject(&self) -> &'static str {
        match self { Self::Placed { .. } => "orders.placed", Self::Cancelled { .. } => "orders.cancelled" }
    }
}
