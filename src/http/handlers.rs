use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::auth::AuthenticatedUser;
use super::error::ApiError;
use super::AppState;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{OrderId, PaymentMethod, Percentage, ProductId, Quantity};
use crate::services::CartEntry;

type ApiResult<T> = Result<T, ApiError>;

/// A JSON body whose rejection still answers with an [`ApiError`].
type JsonBody<T> = Result<Json<T>, JsonRejection>;

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    #[validate(range(min = 1))]
    pub product_id: i64,
    /// Checked by the cart itself so non-positive values report `invalid_quantity`.
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DiscountRequest {
    /// Looked up exactly as sent: no trimming, no case folding.
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartEntry>,
    pub total: Decimal,
    pub discount: Option<Percentage>,
    pub final_total: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub total: Decimal,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "storefront-checkout" }))
}

pub async fn list_products(State(s): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.shop.list_products().await?))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Product>> {
    Ok(Json(s.shop.product(ProductId::new(id)).await?))
}

pub async fn create_session(State(s): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let id = s.sessions.create().await;
    (StatusCode::CREATED, Json(json!({ "session_id": id })))
}

pub async fn end_session(State(s): State<AppState>, Path(session): Path<Uuid>) -> ApiResult<StatusCode> {
    if !s.sessions.end(session).await {
        return Err(ApiError::SessionNotFound(session));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_cart(State(s): State<AppState>, Path(session): Path<Uuid>) -> ApiResult<Json<CartView>> {
    let cart = s.sessions.lock_cart(session).await.ok_or(ApiError::SessionNotFound(session))?;
    let total = s.shop.total(&cart).await?;
    Ok(Json(CartView {
        lines: s.shop.cart_contents(&cart).await?,
        total,
        discount: cart.discount(),
        final_total: crate::services::discounted_total(total, cart.discount()),
        updated_at: cart.updated_at(),
    }))
}

pub async fn add_to_cart(
    State(s): State<AppState>,
    Path(session): Path<Uuid>,
    body: JsonBody<AddToCartRequest>,
) -> ApiResult<Json<CartLineView>> {
    let Json(r) = body?;
    r.validate()?;
    let mut cart = s.sessions.lock_cart(session).await.ok_or(ApiError::SessionNotFound(session))?;
    let product_id = ProductId::new(r.product_id);
    let quantity = s.shop.add_to_cart(&mut cart, product_id, r.quantity).await?;
    Ok(Json(CartLineView { product_id, quantity }))
}

pub async fn clear_cart(State(s): State<AppState>, Path(session): Path<Uuid>) -> ApiResult<StatusCode> {
    let mut cart = s.sessions.lock_cart(session).await.ok_or(ApiError::SessionNotFound(session))?;
    s.shop.clear_cart(&mut cart);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn apply_discount(
    State(s): State<AppState>,
    Path(session): Path<Uuid>,
    body: JsonBody<DiscountRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(r) = body?;
    r.validate()?;
    let mut cart = s.sessions.lock_cart(session).await.ok_or(ApiError::SessionNotFound(session))?;
    let percentage = s.shop.apply_discount(&mut cart, &r.code).await?;
    Ok(Json(json!({ "discount": percentage })))
}

pub async fn clear_discount(State(s): State<AppState>, Path(session): Path<Uuid>) -> ApiResult<StatusCode> {
    let mut cart = s.sessions.lock_cart(session).await.ok_or(ApiError::SessionNotFound(session))?;
    s.shop.clear_discount(&mut cart);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn checkout(
    State(s): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(session): Path<Uuid>,
    body: JsonBody<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<OrderView>)> {
    let Json(r) = body?;
    let mut cart = s.sessions.lock_cart(session).await.ok_or(ApiError::SessionNotFound(session))?;
    let receipt = s.shop.checkout(&mut cart, user_id, r.payment_method).await?;
    drop(cart);
    s.publisher.publish(&receipt.event).await;
    Ok((StatusCode::CREATED, Json(OrderView { order_id: receipt.order_id, total: receipt.total })))
}

pub async fn cancel_order(State(s): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<serde_json::Value>> {
    let event = s.shop.cancel_order(OrderId::new(id)).await?;
    s.publisher.publish(&event).await;
    Ok(Json(json!({ "order_id": event.order_id(), "status": "cancelled" })))
}
