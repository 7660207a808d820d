//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{OrderId, PaymentMethod, ProductId, Quantity, UserId};

/// A persisted order row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Order row before the ledger assigns an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
}

impl NewOrder {
    pub fn pending(user_id: UserId, total: Decimal, payment_method: PaymentMethod) -> Self {
        Self { user_id, total, payment_method, status: OrderStatus::Pending }
    }

    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order { id, user_id: self.user_id, total: self.total, payment_method: self.payment_method, status: self.status, created_at }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Cancelled }

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self { Self::Pending => "pending", Self::Cancelled => "cancelled" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s { "pending" => Some(Self::Pending), "cancelled" => Some(Self::Cancelled), _ => None }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl Order {
    pub fn is_cancellable(&self) -> bool { self.status == OrderStatus::Pending }
}
