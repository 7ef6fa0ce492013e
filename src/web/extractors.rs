//! Bearer-token auth extractors (C13): resolve the calling principal from a
//! static token table loaded at startup (C10), in the same two-tier
//! user/admin shape every job/item handler expects.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::state::AppState;
use crate::web::error::{ApiError, ApiErrorCode};

/// The principal behind a request: which owner's jobs it may touch, and
/// whether it may override that scope (`owner=any` on fleet-wide listings).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub owner_id: String,
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::new(ApiErrorCode::Unauthorized, "missing bearer token"))?;

        let principal = state
            .auth
            .tokens
            .get(token)
            .ok_or_else(|| ApiError::new(ApiErrorCode::Unauthorized, "unknown bearer token"))?;

        Ok(AuthUser {
            owner_id: principal.owner_id.clone(),
            is_admin: principal.is_admin,
        })
    }
}

/// Like [`AuthUser`], but rejects with 403 unless the principal is an admin.
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::new(ApiErrorCode::Forbidden, "admin access required"));
        }
        Ok(AdminUser(user))
    }
}
