//! PostgreSQL ledger. Every statement is a bound, parameterized query.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::{LedgerError, LedgerTransaction, OrderLedger};
use crate::catalog::Catalog;
use crate::domain::aggregates::{DiscountCode, NewOrder, Order, OrderItem, OrderStatus, Product};
use crate::domain::value_objects::{OrderId, PaymentMethod, Percentage, ProductId, Quantity, UserId};

const PRODUCT_COLUMNS: &str = "id, name, unit_price, stock";
const ORDER_COLUMNS: &str = "id, user_id, total, payment_method, status, created_at";

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedger {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self { Self { pool, lock_timeout } }
}

/// Lock and serialization failures are retryable; constraint violations are rejections.
pub(crate) fn classify(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("55P03" | "40001" | "40P01") => return LedgerError::Busy,
            Some(code) if code.starts_with("23") => return LedgerError::Rejected(db.message().to_string()),
            _ => {}
        }
    }
    if matches!(err, sqlx::Error::PoolTimedOut) { return LedgerError::Busy; }
    LedgerError::Database(err)
}

fn product_from_row(row: &PgRow) -> Result<Product, LedgerError> {
    let id = ProductId::new(row.try_get("id").map_err(classify)?);
    let stock: i32 = row.try_get("stock").map_err(classify)?;
    Ok(Product {
        id,
        name: row.try_get("name").map_err(classify)?,
        unit_price: row.try_get("unit_price").map_err(classify)?,
        stock: u32::try_from(stock).map_err(|_| LedgerError::Malformed(format!("negative stock on product {}", id)))?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, LedgerError> {
    let id = OrderId::new(row.try_get("id").map_err(classify)?);
    let method: String = row.try_get("payment_method").map_err(classify)?;
    let status: String = row.try_get("status").map_err(classify)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(classify)?;
    Ok(Order {
        id,
        user_id: UserId::new(row.try_get("user_id").map_err(classify)?),
        total: row.try_get("total").map_err(classify)?,
        payment_method: method.parse::<PaymentMethod>().map_err(|e| LedgerError::Malformed(format!("order {}: {}", id, e)))?,
        status: OrderStatus::parse(&status).ok_or_else(|| LedgerError::Malformed(format!("order {}: status {}", id, status)))?,
        created_at,
    })
}

fn bind_quantity(q: Quantity) -> Result<i32, LedgerError> {
    i32::try_from(q.get()).map_err(|_| LedgerError::Rejected(format!("quantity {} out of range", q)))
}

#[async_trait]
impl Catalog for PgLedger {
    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, LedgerError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        rows.iter().map(product_from_row).collect()
    }

    async fn fetch_discount(&self, code: &str) -> Result<Option<DiscountCode>, LedgerError> {
        let row = sqlx::query("SELECT code, percentage, expires FROM discount_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        let Some(row) = row else { return Ok(None) };
        let percentage = Percentage::new(row.try_get("percentage").map_err(classify)?)
            .map_err(|e| LedgerError::Malformed(format!("discount {}: {}", code, e)))?;
        Ok(Some(DiscountCode {
            code: row.try_get("code").map_err(classify)?,
            percentage,
            expires: row.try_get("expires").map_err(classify)?,
        }))
    }
}

#[async_trait]
impl OrderLedger for PgLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        // transaction-local, so it resets on commit or rollback
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgTransaction {
    async fn fetch_product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, LedgerError> {
        let row = sqlx::query(
            "INSERT INTO orders (user_id, total, payment_method, status) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(order.user_id.get())
        .bind(order.total)
        .bind(order.payment_method.as_str())
        .bind(order.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(OrderId::new(row.try_get("id").map_err(classify)?))
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3)")
            .bind(item.order_id.get())
            .bind(item.product_id.get())
            .bind(bind_quantity(item.quantity)?)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, amount: Quantity) -> Result<(), LedgerError> {
        let done = sqlx::query("UPDATE products SET stock = stock - $1 WHERE id = $2 AND stock >= $1")
            .bind(bind_quantity(amount)?)
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        if done.rows_affected() != 1 {
            return Err(LedgerError::Rejected(format!("stock of product {} below {}", id, amount)));
        }
        Ok(())
    }

    async fn increment_stock(&mut self, id: ProductId, amount: Quantity) -> Result<(), LedgerError> {
        let done = sqlx::query("UPDATE products SET stock = stock + $1 WHERE id = $2")
            .bind(bind_quantity(amount)?)
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        if done.rows_affected() != 1 {
            return Err(LedgerError::Rejected(format!("product {} missing", id)));
        }
        Ok(())
    }

    async fn fetch_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>, LedgerError> {
        let rows = sqlx::query("SELECT order_id, product_id, quantity FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(id.get())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(classify)?;
        rows.iter()
            .map(|row| -> Result<OrderItem, LedgerError> {
                let quantity: i32 = row.try_get("quantity").map_err(classify)?;
                Ok(OrderItem {
                    order_id: OrderId::new(row.try_get("order_id").map_err(classify)?),
                    product_id: ProductId::new(row.try_get("product_id").map_err(classify)?),
                    quantity: Quantity::new(i64::from(quantity))
                        .ok_or_else(|| LedgerError::Malformed(format!("order {} item quantity {}", id, quantity)))?,
                })
            })
            .collect()
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), LedgerError> {
        sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.rollback().await.map_err(classify)
    }
}
