//! Boundary errors and their JSON rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scopegate_auth::{AuthFailure, ErrorBody};
use thiserror::Error;

/// Anything a handler can answer with instead of success.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authorization failed.
    #[error(transparent)]
    Auth(#[from] AuthFailure),

    /// Unknown route or record.
    #[error("resource not found")]
    NotFound,

    /// Request understood but its content is unusable.
    #[error("unprocessable")]
    Unprocessable(String),

    /// Request could not be understood.
    #[error("bad request")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(failure) => {
                StatusCode::from_u16(failure.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Auth(failure) => failure.body(),
            other => ErrorBody::new(other.status().as_u16(), other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unprocessable(detail) | Self::BadRequest(detail) => {
                tracing::debug!("Rejecting request: {detail}");
            }
            Self::Auth(_) | Self::NotFound => {}
        }

        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use scopegate_auth::AuthErrorKind;

    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Unprocessable("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(AuthFailure::from(AuthErrorKind::PermissionDenied)).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthFailure::from(AuthErrorKind::KeySetUnavailable)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bodies() {
        let body = ApiError::NotFound.body();
        assert_eq!(body, ErrorBody::new(404, "resource not found"));

        let body = ApiError::Unprocessable("title taken".into()).body();
        assert_eq!(body.message, "unprocessable");

        let body = ApiError::from(AuthFailure::from(AuthErrorKind::TokenExpired)).body();
        assert_eq!(body, ErrorBody::new(401, "Token expired."));
    }
}
