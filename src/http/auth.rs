//! Acting-user identity, taken only from the header an upstream
//! authenticating proxy sets. Request bodies never name the user.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;
use crate::domain::value_objects::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = &state.auth_user_header;
        let missing = || ApiError::Unauthenticated(header.as_str().to_string());
        let raw = parts.headers.get(header).ok_or_else(missing)?;
        let id: i64 = raw.to_str().ok().and_then(|v| v.trim().parse().ok()).ok_or_else(missing)?;
        if id <= 0 {
            return Err(missing());
        }
        Ok(Self(UserId::new(id)))
    }
}
