use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::ShopError;

/// Seconds a client should wait before retrying a `busy` checkout.
pub const RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Shop(#[from] ShopError),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("missing or invalid {0} header")]
    Unauthenticated(String),

    #[error("{0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self { Self::Validation(err.to_string()) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::Validation(rejection.body_text()) }
}

/// Stable machine-readable kind for each core failure.
pub fn error_kind(err: &ShopError) -> &'static str {
    match err {
        ShopError::ProductNotFound(_) => "product_not_found",
        ShopError::DiscountCodeNotFound => "discount_code_not_found",
        ShopError::DiscountCodeExpired { .. } => "discount_code_expired",
        ShopError::OrderNotFound(_) => "order_not_found",
        ShopError::InsufficientStock { .. } => "insufficient_stock",
        ShopError::EmptyCart => "empty_cart",
        ShopError::ZeroTotal => "zero_total",
        ShopError::InvalidQuantity(_) => "invalid_quantity",
        ShopError::OrderInsertFailed(_) => "order_insert_failed",
        ShopError::OrderItemFailed { .. } => "order_item_failed",
        ShopError::StockUpdateFailed { .. } => "stock_update_failed",
        ShopError::OrderNotCancellable { .. } => "order_not_cancellable",
        ShopError::Busy => "busy",
        ShopError::Ledger(_) => "ledger_error",
    }
}

fn shop_status(err: &ShopError) -> StatusCode {
    match err {
        ShopError::ProductNotFound(_) | ShopError::DiscountCodeNotFound | ShopError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        ShopError::InsufficientStock { .. } | ShopError::OrderNotCancellable { .. } => StatusCode::CONFLICT,
        ShopError::DiscountCodeExpired { .. } | ShopError::EmptyCart | ShopError::ZeroTotal | ShopError::InvalidQuantity(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ShopError::Busy => StatusCode::SERVICE_UNAVAILABLE,
        ShopError::OrderInsertFailed(_)
        | ShopError::OrderItemFailed { .. }
        | ShopError::StockUpdateFailed { .. }
        | ShopError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            Self::Shop(err) => (shop_status(err), error_kind(err)),
            Self::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            Self::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
        };

        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(json!({ "error": kind, "message": message }))).into_response();
        if matches!(self, Self::Shop(ShopError::Busy)) {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ProductId;

    #[test]
    fn test_busy_is_retryable_503() {
        let response = ApiError::from(ShopError::Busy).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_status_mapping() {
        let stock = ShopError::InsufficientStock { product_id: ProductId::new(1), available: 0, requested: 1 };
        assert_eq!(ApiError::from(stock).into_response().status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(ShopError::EmptyCart).into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::Unauthenticated("x-user".into()).into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_kind(&ShopError::ZeroTotal), "zero_total");
    }
}
