//! Bearer-token authentication with role-based access control.
//!
//! Every protected request carries `Authorization: Bearer <access token>`.
//! The gate verifies the token, loads the user record, and only then hands
//! control to the handler. Failures are terminal: the gate never retries and
//! never refreshes. Renewal is the client's job (see [`crate::session`]).

mod bearer;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use bearer::bearer_token;
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint};
pub use ip::{HasHeadersAndExtensions, UNKNOWN_CLIENT, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
