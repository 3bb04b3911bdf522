//! Profile endpoints for the authenticated user.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::Auth;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/{id}/image", get(image))
        .with_state(state)
}

/// The caller's own profile, as loaded by the gate.
async fn me(auth: Auth) -> impl IntoResponse {
    Json(auth.user.user.profile())
}

async fn image(
    State(state): State<UsersState>,
    _auth: Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;

    let image = state
        .db
        .users()
        .get_image(&id)
        .await
        .db_err("Failed to load image")?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, image.content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        image.bytes,
    ))
}
