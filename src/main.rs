//! Storefront checkout service

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_checkout::config::AppConfig;
use storefront_checkout::http::{self, AppState, EventPublisher, SessionStore};
use storefront_checkout::ledger::{MemoryLedger, OrderLedger, PgLedger};
use storefront_checkout::{DiscountCode, Percentage, Product, ProductId, Storefront};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env()?;

    let ledger: Arc<dyn OrderLedger> = match &cfg.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .acquire_timeout(cfg.lock_timeout)
                .connect(url)
                .await
                .context("connecting to DATABASE_URL")?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgLedger::new(db, cfg.lock_timeout))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory ledger with demo catalog, orders are not persisted");
            let ledger = MemoryLedger::new(cfg.lock_timeout);
            seed_demo_catalog(&ledger).await?;
            Arc::new(ledger)
        }
    };

    let nats = match &cfg.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "NATS unavailable; order events will not be published");
                None
            }
        },
        None => None,
    };

    let publisher = EventPublisher::new(nats);
    if publisher.is_enabled() {
        tracing::info!("publishing order events to NATS");
    }

    let auth_user_header = HeaderName::from_bytes(cfg.auth_user_header.as_bytes())?;
    let sessions = SessionStore::new(cfg.session_ttl);
    tokio::spawn(purge_idle_sessions(sessions.clone()));

    let state = AppState::new(Storefront::new(ledger), sessions, publisher, auth_user_header);
    let app = http::router(state);

    tracing::info!("storefront-checkout listening on 0.0.0.0:{}", cfg.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", cfg.port)).await?, app).await?;
    Ok(())
}

async fn purge_idle_sessions(sessions: SessionStore) {
    let mut tick = tokio::time::interval(sessions.ttl() / 2);
    loop {
        tick.tick().await;
        let purged = sessions.purge_idle().await;
        if purged > 0 {
            tracing::debug!(purged, "dropped idle cart sessions");
        }
    }
}

async fn seed_demo_catalog(ledger: &MemoryLedger) -> Result<()> {
    let products = [
        (1, "Espresso beans 1kg", Decimal::new(2490, 2), 40),
        (2, "Pour-over kettle", Decimal::new(5900, 2), 12),
        (3, "Paper filters (100)", Decimal::new(499, 2), 200),
    ];
    for (id, name, price, stock) in products {
        ledger.insert_product(Product::new(ProductId::new(id), name, price, stock)).await;
    }
    let expires = NaiveDate::from_ymd_opt(2099, 12, 31).context("demo discount expiry")?;
    ledger.insert_discount(DiscountCode::new("WELCOME10", Percentage::new(Decimal::TEN)?, expires)).await;
    Ok(())
}
