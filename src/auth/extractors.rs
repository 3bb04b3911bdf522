//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, error};

use super::bearer::bearer_token;
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::db::UserRole;

/// Role requirement checked after authentication succeeds.
pub trait RoleConstraint: Send + Sync + 'static {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated user.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: UserRole) -> bool {
        true
    }
}

/// Admins only. Other users get 403.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

/// Core authentication logic: bearer token, then verification, then user lookup.
async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = bearer_token(&parts.headers).ok_or(AuthErrorKind::NoTokenProvided)?;

    let claims = state.jwt().verify_access(token).map_err(|e| {
        debug!(reason = %e, path = %parts.uri.path(), "Rejected access token");
        AuthErrorKind::from(e)
    })?;

    let user = state
        .db()
        .users()
        .get_by_id(&claims.sub)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load user for token");
            AuthErrorKind::DatabaseError
        })?
        .ok_or_else(|| {
            debug!(user_id = %claims.sub, "Token subject no longer exists");
            AuthErrorKind::IdentityNotFound
        })?;

    Ok(AuthenticatedUser { claims, user })
}

/// Extractor for API endpoints that require authentication.
///
/// `Auth` (or `Auth<AnyRole>`) admits any authenticated user; `Auth<AdminOnly>`
/// additionally requires the admin role. Authentication failures always take
/// precedence over the role check.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub user: AuthenticatedUser,
    _role: PhantomData<R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = authenticate_request(parts, state).await?;

        if !R::allows(user.role()) {
            debug!(user_id = %user.id(), "Insufficient role");
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }

        Ok(Auth {
            user,
            _role: PhantomData,
        })
    }
}
