//! Caller identity extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use renderq_core::error::CoreError;
use renderq_core::types::DbId;

use crate::error::AppError;

/// Header carrying the caller's user ID.
pub const OWNER_HEADER: &str = "x-user-id";

/// The calling user, taken from the `X-User-Id` header.
///
/// Authentication happens upstream; this only parses the identity the
/// gateway forwards. A missing, non-numeric, or non-positive value is
/// rejected with 401.
///
/// ```ignore
/// async fn my_handler(owner: RequestOwner) -> AppResult<Json<()>> {
///     tracing::info!(owner_id = owner.owner_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOwner {
    pub owner_id: DbId,
}

impl RequestOwner {
    /// Reject access to a record owned by someone else.
    pub fn ensure_owns(&self, owner_id: DbId, entity: &str) -> Result<(), AppError> {
        if self.owner_id == owner_id {
            Ok(())
        } else {
            Err(AppError::Core(CoreError::Forbidden(format!(
                "{entity} belongs to another user"
            ))))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestOwner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized("Missing X-User-Id header".into()))
            })?;

        let owner_id: DbId = raw.trim().parse().ok().filter(|id| *id > 0).ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "X-User-Id must be a positive integer".into(),
            ))
        })?;

        Ok(RequestOwner { owner_id })
    }
}
