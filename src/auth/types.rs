//! Authentication user types.

use crate::db::{User, UserRole};
use crate::jwt::Claims;

/// Identity attached to a request once the gate has let it through.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Claims from the verified access token
    pub claims: Claims,
    /// The user record, loaded fresh for this request
    pub user: User,
}

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }
}
