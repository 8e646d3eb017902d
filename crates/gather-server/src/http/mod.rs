//! HTTP API: bearer auth extractor, error mapping, event handlers.

pub mod events;

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::{StatusCode, header, request::Parts};
use axum::response::{IntoResponse, Response};

use gather_core::errors::{CoreError, ErrorBody};
use gather_core::ids::PrincipalId;

use crate::auth::AuthError;
use crate::server::AppState;

/// API-boundary error: a status code plus the structured body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// 401 with the standard body.
    #[must_use]
    pub fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                code: "UNAUTHORIZED".into(),
                message: message.into(),
            },
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Authorization { .. } => StatusCode::FORBIDDEN,
            CoreError::TransientStore { .. } | CoreError::Channel { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            body: err.to_error_body(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::unauthorized(&err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// The verified caller, extracted from the `Authorization: Bearer` header.
pub struct AuthPrincipal(pub PrincipalId);

impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing credential token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("missing credential token"))?;
        let principal = state.auth.verify(token).await?;
        Ok(Self(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = ApiError::from(CoreError::validation("bad"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "VALIDATION_ERROR");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::from(CoreError::not_found("Event"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.message, "Event not found");
    }

    #[test]
    fn authorization_maps_to_403() {
        let err = ApiError::from(CoreError::Authorization {
            message: "nope".into(),
        });
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn transient_store_maps_to_500() {
        let err = ApiError::from(CoreError::TransientStore {
            message: "down".into(),
        });
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn auth_error_maps_to_401() {
        let err = ApiError::from(AuthError::InvalidToken);
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.body.code, "UNAUTHORIZED");
    }
}
