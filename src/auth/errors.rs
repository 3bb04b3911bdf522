//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::JwtError;

/// Why the gate rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NoTokenProvided,
    TokenExpired,
    TokenMalformed,
    TokenVerificationFailed,
    IdentityNotFound,
    InsufficientRole,
    DatabaseError,
}

impl AuthErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthErrorKind::NoTokenProvided
            | AuthErrorKind::TokenExpired
            | AuthErrorKind::TokenMalformed
            | AuthErrorKind::TokenVerificationFailed
            | AuthErrorKind::IdentityNotFound => StatusCode::UNAUTHORIZED,
            AuthErrorKind::InsufficientRole => StatusCode::FORBIDDEN,
            AuthErrorKind::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable reason. Stable, clients may match on it.
    pub fn message(&self) -> &'static str {
        match self {
            AuthErrorKind::NoTokenProvided => "no token provided",
            AuthErrorKind::TokenExpired => "token expired",
            AuthErrorKind::TokenMalformed => "token malformed",
            AuthErrorKind::TokenVerificationFailed => "token verification failed",
            AuthErrorKind::IdentityNotFound => "user not found",
            AuthErrorKind::InsufficientRole => "admin privileges required",
            AuthErrorKind::DatabaseError => "database error",
        }
    }

    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::NoTokenProvided => "NO_TOKEN",
            AuthErrorKind::TokenExpired => "TOKEN_EXPIRED",
            AuthErrorKind::TokenMalformed => "TOKEN_MALFORMED",
            AuthErrorKind::TokenVerificationFailed => "TOKEN_VERIFICATION_FAILED",
            AuthErrorKind::IdentityNotFound => "USER_NOT_FOUND",
            AuthErrorKind::InsufficientRole => "INSUFFICIENT_ROLE",
            AuthErrorKind::DatabaseError => "DATABASE_ERROR",
        }
    }
}

impl From<JwtError> for AuthErrorKind {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Expired => AuthErrorKind::TokenExpired,
            JwtError::Malformed => AuthErrorKind::TokenMalformed,
            _ => AuthErrorKind::TokenVerificationFailed,
        }
    }
}

/// API authentication error, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
}

impl ApiAuthError {
    pub(super) fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: &'static str,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        (
            self.kind.status_code(),
            Json(ErrorResponse {
                error: self.kind.message(),
                code: self.kind.code(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_error_mapping() {
        assert_eq!(
            AuthErrorKind::from(JwtError::Expired),
            AuthErrorKind::TokenExpired
        );
        assert_eq!(
            AuthErrorKind::from(JwtError::Malformed),
            AuthErrorKind::TokenMalformed
        );
        assert_eq!(
            AuthErrorKind::from(JwtError::VerificationFailed("nbf".into())),
            AuthErrorKind::TokenVerificationFailed
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthErrorKind::IdentityNotFound.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthErrorKind::InsufficientRole.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthErrorKind::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
