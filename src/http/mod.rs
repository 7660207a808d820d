//! JSON request layer over [`Storefront`].
//!
//! Owns session storage and the acting-user header; maps core failures to
//! status codes. Nothing here decides checkout outcomes.

use axum::http::HeaderName;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::Storefront;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod publisher;
pub mod session;

pub use auth::AuthenticatedUser;
pub use error::ApiError;
pub use publisher::EventPublisher;
pub use session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub shop: Storefront,
    pub sessions: SessionStore,
    pub publisher: EventPublisher,
    pub auth_user_header: HeaderName,
}

impl AppState {
    pub fn new(shop: Storefront, sessions: SessionStore, publisher: EventPublisher, auth_user_header: HeaderName) -> Self {
        Self { shop, sessions, publisher, auth_user_header }
    }
}

pub fn router(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/:session", delete(end_session))
        .route("/api/v1/cart/:session", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/discount", post(apply_discount).delete(clear_discount))
        .route("/api/v1/cart/:session/checkout", post(checkout))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
