//! Admin API endpoints.
//!
//! All endpoints require admin role.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::{AdminOnly, Auth};
use crate::db::{Database, UserProfile, UserRole};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(set_role))
        .route("/users/{id}", delete(delete_user))
        .with_state(state)
}

/// List all users.
async fn list_users(
    State(state): State<AdminState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .users()
        .list()
        .await
        .db_err("Failed to list users")?;

    let profiles: Vec<UserProfile> = users.iter().map(|u| u.profile()).collect();
    Ok(Json(profiles))
}

#[derive(Deserialize)]
struct SetRoleRequest {
    role: String,
}

async fn set_role(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;

    let role = match payload.role.as_str() {
        "user" => UserRole::User,
        "admin" => UserRole::Admin,
        _ => return Err(ApiError::bad_request("Role must be 'user' or 'admin'")),
    };

    if id == auth.user.id() {
        return Err(ApiError::bad_request("You cannot change your own role"));
    }

    let updated = state
        .db
        .users()
        .set_role(&id, role)
        .await
        .db_err("Failed to set role")?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    let user = state
        .db
        .users()
        .get_by_id(&id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(admin_id = %auth.user.id(), user_id = %id, role = role.as_str(), "Role changed");

    Ok(Json(user.profile()))
}

async fn delete_user(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;

    if id == auth.user.id() {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let deleted = state
        .db
        .users()
        .delete(&id)
        .await
        .db_err("Failed to delete user")?;
    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    info!(admin_id = %auth.user.id(), user_id = %id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}
