mod admin;
mod auth;
mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use auth::{MAX_IMAGE_BYTES, RefreshResponse, SessionResponse};
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    no_signup: bool,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
        no_signup,
        rate_limit_config,
    };

    let users_state = users::UsersState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let admin_state = admin::AdminState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/users", users::router(users_state))
        .nest("/admin", admin::router(admin_state))
}
