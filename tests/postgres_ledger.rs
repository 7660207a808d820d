//! Runs against a real PostgreSQL named by `TEST_DATABASE_URL`. Ignored by
//! default; run with `cargo test -- --ignored`.

use std::env;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::{Mutex, MutexGuard};

use storefront_checkout::ledger::{LedgerTransaction, OrderLedger, PgLedger};
use storefront_checkout::{Cart, Catalog, OrderStatus, PaymentMethod, ProductId, ShopError, Storefront, UserId};

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct TestDb {
    pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for postgres tests");
    let guard = TEST_DB_LOCK.get_or_init(|| Mutex::new(())).lock().await;

    let pool = PgPool::connect(&url).await.expect("connect test db");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    sqlx::query("TRUNCATE order_items, orders, discount_codes, products RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("reset tables");
    TestDb { pool, _guard: guard }
}

async fn insert_product(pool: &PgPool, name: &str, price: Decimal, stock: i32) -> ProductId {
    let id: i64 = sqlx::query_scalar("INSERT INTO products (name, unit_price, stock) VALUES ($1, $2, $3) RETURNING id")
        .bind(name)
        .bind(price)
        .bind(stock)
        .fetch_one(pool)
        .await
        .expect("insert product");
    ProductId::new(id)
}

fn shop(pool: &PgPool, lock_timeout: Duration) -> (Storefront, PgLedger) {
    let ledger = PgLedger::new(pool.clone(), lock_timeout);
    (Storefront::new(Arc::new(ledger.clone())), ledger)
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn checkout_commits_order_items_and_stock() {
    let db = init_test_db().await;
    let widget = insert_product(&db.pool, "Widget", Decimal::new(1000, 2), 10).await;
    let (shop, ledger) = shop(&db.pool, Duration::from_secs(5));

    let mut cart = Cart::new();
    shop.add_to_cart(&mut cart, widget, 2).await.unwrap();
    let receipt = shop.checkout(&mut cart, UserId::new(1), PaymentMethod::CreditCard).await.unwrap();

    assert_eq!(receipt.total, Decimal::new(2000, 2));
    assert!(cart.is_empty());
    assert_eq!(ledger.fetch_product(widget).await.unwrap().unwrap().stock, 8);

    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
        .bind(receipt.order_id.get())
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(items, 1);
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn failed_line_rolls_back_everything() {
    let db = init_test_db().await;
    let a = insert_product(&db.pool, "A", Decimal::new(100, 2), 5).await;
    let b = insert_product(&db.pool, "B", Decimal::new(100, 2), 5).await;
    let (shop, ledger) = shop(&db.pool, Duration::from_secs(5));

    let mut cart = Cart::new();
    shop.add_to_cart(&mut cart, a, 2).await.unwrap();
    shop.add_to_cart(&mut cart, b, 5).await.unwrap();
    sqlx::query("UPDATE products SET stock = 1 WHERE id = $1").bind(b.get()).execute(&db.pool).await.unwrap();

    let err = shop.checkout(&mut cart, UserId::new(1), PaymentMethod::Paypal).await.unwrap_err();
    assert!(matches!(err, ShopError::InsufficientStock { product_id, .. } if product_id == b));

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(&db.pool).await.unwrap();
    assert_eq!(orders, 0);
    assert_eq!(ledger.fetch_product(a).await.unwrap().unwrap().stock, 5);
    assert_eq!(cart.line_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs TEST_DATABASE_URL"]
async fn race_for_last_unit_commits_once() {
    let db = init_test_db().await;
    let last = insert_product(&db.pool, "Last one", Decimal::new(500, 2), 1).await;
    let (shop, ledger) = shop(&db.pool, Duration::from_secs(5));

    let mut handles = Vec::new();
    for user in 1..=6 {
        let shop = shop.clone();
        handles.push(tokio::spawn(async move {
            let mut cart = Cart::new();
            shop.add_to_cart(&mut cart, last, 1).await?;
            shop.checkout(&mut cart, UserId::new(user), PaymentMethod::Paypal).await
        }));
    }
    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            committed += 1;
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(ledger.fetch_product(last).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn held_row_lock_surfaces_as_busy() {
    let db = init_test_db().await;
    let widget = insert_product(&db.pool, "Widget", Decimal::new(1000, 2), 3).await;
    let (shop, ledger) = shop(&db.pool, Duration::from_millis(100));

    let mut cart = Cart::new();
    shop.add_to_cart(&mut cart, widget, 1).await.unwrap();

    let mut holder = ledger.begin().await.unwrap();
    holder.fetch_product_for_update(widget).await.unwrap();

    let err = shop.checkout(&mut cart, UserId::new(1), PaymentMethod::Paypal).await.unwrap_err();
    assert!(err.is_retryable(), "expected busy, got {err}");
    holder.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "needs TEST_DATABASE_URL"]
async fn cancellation_restores_stock() {
    let db = init_test_db().await;
    let widget = insert_product(&db.pool, "Widget", Decimal::new(1000, 2), 4).await;
    let (shop, ledger) = shop(&db.pool, Duration::from_secs(5));

    let mut cart = Cart::new();
    shop.add_to_cart(&mut cart, widget, 3).await.unwrap();
    let receipt = shop.checkout(&mut cart, UserId::new(9), PaymentMethod::Paypal).await.unwrap();
    assert_eq!(ledger.fetch_product(widget).await.unwrap().unwrap().stock, 1);

    shop.cancel_order(receipt.order_id).await.unwrap();
    assert_eq!(ledger.fetch_product(widget).await.unwrap().unwrap().stock, 4);
    let status: String = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(receipt.order_id.get())
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(status, OrderStatus::Cancelled.as_str());

    assert!(matches!(shop.cancel_order(receipt.order_id).await, Err(ShopError::OrderNotCancellable { .. })));
}
