//! In-memory ledger with row-level locking.
//!
//! Each product and order row has its own async mutex. A transaction takes the
//! row lock on its first locking read or write of that row and keeps it until
//! the transaction ends. Writes are buffered in the transaction and applied to
//! the shared tables in one step at commit, before the row locks are released,
//! so a waiter always sees the committed result.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{LedgerError, LedgerTransaction, OrderLedger};
use crate::catalog::Catalog;
use crate::domain::aggregates::{DiscountCode, NewOrder, Order, OrderItem, OrderStatus, Product};
use crate::domain::value_objects::{OrderId, ProductId, Quantity};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Product(ProductId),
    Order(OrderId),
}

#[derive(Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    discounts: HashMap<String, DiscountCode>,
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
}

/// Injected write failures. Only tests can switch them on.
#[derive(Default)]
struct Faults {
    order_insert: bool,
    order_item_at: Option<usize>,
    stock_update_for: Option<ProductId>,
}

struct Inner {
    tables: RwLock<Tables>,
    row_locks: SyncMutex<HashMap<RowKey, Arc<Mutex<()>>>>,
    next_order_id: AtomicI64,
    lock_timeout: Duration,
    faults: RwLock<Faults>,
}

#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Inner>,
}

impl Default for MemoryLedger {
    fn default() -> Self { Self::new(DEFAULT_LOCK_TIMEOUT) }
}

impl MemoryLedger {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: SyncMutex::new(HashMap::new()),
                next_order_id: AtomicI64::new(1),
                lock_timeout,
                faults: RwLock::new(Faults::default()),
            }),
        }
    }

    /// Inserts or replaces a product row outside any transaction.
    pub async fn insert_product(&self, product: Product) {
        self.inner.tables.write().await.products.insert(product.id, product);
    }

    pub async fn insert_discount(&self, discount: DiscountCode) {
        self.inner.tables.write().await.discounts.insert(discount.code.clone(), discount);
    }
}

#[cfg(test)]
impl MemoryLedger {
    pub async fn remove_product(&self, id: ProductId) -> Option<Product> {
        self.inner.tables.write().await.products.remove(&id)
    }

    pub async fn set_unit_price(&self, id: ProductId, price: rust_decimal::Decimal) {
        if let Some(p) = self.inner.tables.write().await.products.get_mut(&id) {
            p.unit_price = price;
        }
    }

    /// Committed orders in id order.
    pub async fn orders(&self) -> Vec<Order> {
        self.inner.tables.read().await.orders.values().cloned().collect()
    }

    pub async fn order(&self, id: OrderId) -> Option<Order> {
        self.inner.tables.read().await.orders.get(&id).cloned()
    }

    /// Committed items of one order.
    pub async fn items_of(&self, id: OrderId) -> Vec<OrderItem> {
        self.inner.tables.read().await.items.iter().filter(|i| i.order_id == id).copied().collect()
    }

    pub async fn item_count(&self) -> usize {
        self.inner.tables.read().await.items.len()
    }

    pub async fn set_fail_on_order_insert(&self, fail: bool) {
        self.inner.faults.write().await.order_insert = fail;
    }

    /// Fails the `nth` (1-based) order item insert of every transaction.
    pub async fn set_fail_on_order_item(&self, nth: Option<usize>) {
        self.inner.faults.write().await.order_item_at = nth;
    }

    pub async fn set_fail_on_stock_update(&self, product: Option<ProductId>) {
        self.inner.faults.write().await.stock_update_for = product;
    }
}

#[async_trait]
impl Catalog for MemoryLedger {
    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        Ok(self.inner.tables.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, LedgerError> {
        Ok(self.inner.tables.read().await.products.values().cloned().collect())
    }

    async fn fetch_discount(&self, code: &str) -> Result<Option<DiscountCode>, LedgerError> {
        Ok(self.inner.tables.read().await.discounts.get(code).cloned())
    }
}

#[async_trait]
impl OrderLedger for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            held: HashMap::new(),
            stock_deltas: HashMap::new(),
            new_orders: Vec::new(),
            new_items: Vec::new(),
            status_changes: Vec::new(),
            items_inserted: 0,
        }))
    }
}

pub struct MemoryTransaction {
    inner: Arc<Inner>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    stock_deltas: HashMap<ProductId, i64>,
    new_orders: Vec<Order>,
    new_items: Vec<OrderItem>,
    status_changes: Vec<(OrderId, OrderStatus)>,
    items_inserted: usize,
}

impl MemoryTransaction {
    async fn lock(&mut self, key: RowKey) -> Result<(), LedgerError> {
        if self.held.contains_key(&key) { return Ok(()); }
        let row = {
            let mut rows = self.inner.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(rows.entry(key).or_default())
        };
        let guard = tokio::time::timeout(self.inner.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| LedgerError::Busy)?;
        self.held.insert(key, guard);
        Ok(())
    }

    /// Releases every held row lock and forgets rows nobody else is waiting on.
    fn release_locks(&mut self) {
        if self.held.is_empty() { return; }
        let keys: Vec<RowKey> = self.held.drain().map(|(key, _)| key).collect();
        let mut rows = self.inner.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if rows.get(&key).is_some_and(|row| Arc::strong_count(row) == 1) {
                rows.remove(&key);
            }
        }
    }

    /// Committed stock plus this transaction's pending changes.
    async fn effective_stock(&self, id: ProductId) -> Option<i64> {
        let tables = self.inner.tables.read().await;
        let committed = i64::from(tables.products.get(&id)?.stock);
        Some(committed + self.stock_deltas.get(&id).copied().unwrap_or(0))
    }

    async fn visible_order(&self, id: OrderId) -> Option<Order> {
        let mut order = match self.new_orders.iter().find(|o| o.id == id) {
            Some(o) => o.clone(),
            None => self.inner.tables.read().await.orders.get(&id).cloned()?,
        };
        if let Some((_, status)) = self.status_changes.iter().rev().find(|(oid, _)| *oid == id) {
            order.status = *status;
        }
        Some(order)
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn fetch_product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        self.lock(RowKey::Product(id)).await?;
        let tables = self.inner.tables.read().await;
        let Some(mut product) = tables.products.get(&id).cloned() else { return Ok(None) };
        drop(tables);
        let stock = self.effective_stock(id).await.unwrap_or(0);
        product.stock = u32::try_from(stock).map_err(|_| LedgerError::Malformed(format!("stock of product {} out of range", id)))?;
        Ok(Some(product))
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderId, LedgerError> {
        if self.inner.faults.read().await.order_insert {
            return Err(LedgerError::Rejected("order insert refused".into()));
        }
        let id = OrderId::new(self.inner.next_order_id.fetch_add(1, Ordering::SeqCst));
        self.new_orders.push(order.clone().into_order(id, Utc::now()));
        Ok(id)
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), LedgerError> {
        self.items_inserted += 1;
        if self.inner.faults.read().await.order_item_at == Some(self.items_inserted) {
            return Err(LedgerError::Rejected(format!("order item {} refused", self.items_inserted)));
        }
        if self.visible_order(item.order_id).await.is_none() {
            return Err(LedgerError::Rejected(format!("order {} does not exist", item.order_id)));
        }
        self.new_items.push(*item);
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, amount: Quantity) -> Result<(), LedgerError> {
        self.lock(RowKey::Product(id)).await?;
        if self.inner.faults.read().await.stock_update_for == Some(id) {
            return Err(LedgerError::Rejected(format!("stock update of product {} refused", id)));
        }
        let available = self.effective_stock(id).await
            .ok_or_else(|| LedgerError::Rejected(format!("product {} missing", id)))?;
        let amount = i64::from(amount.get());
        if available < amount {
            return Err(LedgerError::Rejected(format!("stock of product {} below {}", id, amount)));
        }
        *self.stock_deltas.entry(id).or_insert(0) -= amount;
        Ok(())
    }

    async fn increment_stock(&mut self, id: ProductId, amount: Quantity) -> Result<(), LedgerError> {
        self.lock(RowKey::Product(id)).await?;
        let available = self.effective_stock(id).await
            .ok_or_else(|| LedgerError::Rejected(format!("product {} missing", id)))?;
        let amount = i64::from(amount.get());
        if available + amount > i64::from(u32::MAX) {
            return Err(LedgerError::Rejected(format!("stock of product {} would overflow", id)));
        }
        *self.stock_deltas.entry(id).or_insert(0) += amount;
        Ok(())
    }

    async fn fetch_order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, LedgerError> {
        self.lock(RowKey::Order(id)).await?;
        Ok(self.visible_order(id).await)
    }

    async fn order_items(&mut self, id: OrderId) -> Result<Vec<OrderItem>, LedgerError> {
        let mut items: Vec<OrderItem> =
            self.inner.tables.read().await.items.iter().filter(|i| i.order_id == id).copied().collect();
        items.extend(self.new_items.iter().filter(|i| i.order_id == id));
        Ok(items)
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), LedgerError> {
        self.lock(RowKey::Order(id)).await?;
        if self.visible_order(id).await.is_none() {
            return Err(LedgerError::Rejected(format!("order {} does not exist", id)));
        }
        self.status_changes.push((id, status));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), LedgerError> {
        let inner = Arc::clone(&self.inner);
        let mut tables = inner.tables.write().await;

        // validate everything before touching anything
        let mut new_stock = Vec::with_capacity(self.stock_deltas.len());
        for (id, delta) in &self.stock_deltas {
            let current = tables.products.get(id)
                .ok_or_else(|| LedgerError::Rejected(format!("product {} missing", id)))?;
            let next = u32::try_from(i64::from(current.stock) + delta)
                .map_err(|_| LedgerError::Rejected(format!("stock of product {} out of range", id)))?;
            new_stock.push((*id, next));
        }

        for (id, stock) in new_stock {
            if let Some(p) = tables.products.get_mut(&id) { p.stock = stock; }
        }
        for order in self.new_orders.drain(..) {
            tables.orders.insert(order.id, order);
        }
        tables.items.append(&mut self.new_items);
        for (id, status) in self.status_changes.drain(..) {
            if let Some(o) = tables.orders.get_mut(&id) { o.status = status; }
        }
        drop(tables);
        // row locks release here, after the tables reflect the commit
        self.release_locks();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}
