//! Authentication errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token in header, cookie or query.
    #[error("missing authorization token")]
    MissingToken,

    /// Invalid authorization header format.
    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    /// Bad signature, wrong algorithm or malformed token.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token expired.
    #[error("token expired")]
    TokenExpired,

    /// Token id is on the revocation list.
    #[error("token revoked")]
    Revoked,

    /// Subject claim missing or empty.
    #[error("token has no subject")]
    MissingSubject,

    /// Request origin is not allowed.
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// Internal error.
    #[error("internal auth error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
            AuthError::InvalidAuthHeader => (StatusCode::UNAUTHORIZED, "invalid_auth_header"),
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::Revoked => (StatusCode::UNAUTHORIZED, "token_revoked"),
            AuthError::MissingSubject => (StatusCode::UNAUTHORIZED, "missing_subject"),
            AuthError::OriginNotAllowed(_) => (StatusCode::FORBIDDEN, "origin_not_allowed"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(AuthErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::Revoked.to_string(), "token revoked");
        assert_eq!(
            AuthError::InvalidToken("bad".to_string()).to_string(),
            "invalid token: bad"
        );
    }

    #[test]
    fn test_auth_error_status() {
        assert_eq!(
            AuthError::Revoked.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::OriginNotAllowed("x".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
