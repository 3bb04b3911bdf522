//! Registration, login, token refresh and logout.

use axum::{
    Json, Router,
    extract::{FromRequest, Multipart, Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt};
use crate::auth::AuthErrorKind;
use crate::db::{CreateUserError, Database, NewUser, UserImage, UserProfile, UserRole};
use crate::jwt::{JwtConfig, TokenPair};
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

/// Largest accepted profile image.
pub const MAX_IMAGE_BYTES: usize = 1024 * 1024;

/// Raster formats accepted for profile images.
const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub no_signup: bool,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state.clone());

    let router = Router::new().merge(login_router).merge(session_router);

    if state.no_signup {
        router
    } else {
        let register_router = Router::new()
            .route("/register", post(register))
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.rate_limit_config,
                rate_limit_register,
            ));
        router.merge(register_router)
    }
}

/// Response for login and registration.
#[derive(Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

/// Response for refresh.
#[derive(Serialize, Deserialize)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

#[derive(Deserialize, Default)]
struct RegisterRequest {
    name: String,
    email: String,
    #[serde(default)]
    phone: Option<String>,
    password: String,
}

async fn register(
    State(state): State<AuthState>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let (payload, image) = read_registration(request).await?;

    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    let phone = payload
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    validate_name(&name)?;
    validate_email(&email)?;
    if let Some(phone) = &phone {
        validate_phone(phone)?;
    }
    validate_password(&payload.password)?;

    let available = state
        .db
        .users()
        .is_available(&email, phone.as_deref())
        .await
        .db_err("Failed to check login availability")?;
    if !available {
        return Err(ApiError::conflict("Email or phone is already registered"));
    }

    let user = state
        .db
        .users()
        .create(NewUser {
            name,
            email,
            phone,
            password: payload.password,
            role: UserRole::User,
            image,
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration
            CreateUserError::Conflict => ApiError::conflict("Email or phone is already registered"),
            e => ApiError::db_error("Failed to create user", e),
        })?;

    let tokens = state
        .jwt
        .issue_pair(&user.id)
        .internal_err("Failed to issue tokens")?;

    info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            user: user.profile(),
            tokens,
        }),
    ))
}

/// Accept registration data as JSON or as multipart form with an optional image.
async fn read_registration(
    request: Request,
) -> Result<(RegisterRequest, Option<UserImage>), ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart).await
    } else {
        let Json(payload) = Json::<RegisterRequest>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok((payload, None))
    }
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(RegisterRequest, Option<UserImage>), ApiError> {
    let mut payload = RegisterRequest::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                if bytes.is_empty() {
                    continue;
                }
                if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
                    return Err(ApiError::bad_request(
                        "Image must be PNG, JPEG, GIF or WebP",
                    ));
                }
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(ApiError::bad_request("Image is too large"));
                }
                image = Some(UserImage {
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "name" | "email" | "phone" | "password" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                match name.as_str() {
                    "name" => payload.name = value,
                    "email" => payload.email = value,
                    "phone" => payload.phone = Some(value),
                    _ => payload.password = value,
                }
            }
            other => warn!(field = %other, "Ignoring unknown registration field"),
        }
    }

    Ok((payload, image))
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Name cannot be longer than {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::bad_request("Invalid email address")),
    }
}

fn validate_phone(phone: &str) -> Result<(), ApiError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid phone number"))
    }
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password cannot be longer than {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    password: String,
}

async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let non_empty = |v: Option<String>| v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let login = non_empty(payload.email)
        .or_else(|| non_empty(payload.phone))
        .ok_or_else(|| ApiError::bad_request("Email or phone is required"))?;

    let user = state
        .db
        .users()
        .get_by_login(&login)
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user else {
        info!("Login failed: unknown user");
        return Err(ApiError::unauthorized("invalid credentials"));
    };

    let valid = state
        .db
        .users()
        .verify_password(&user, &payload.password)
        .await
        .internal_err("Failed to verify password")?;

    if !valid {
        info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    let tokens = state
        .jwt
        .issue_pair(&user.id)
        .internal_err("Failed to issue tokens")?;

    info!(user_id = %user.id, "User logged in");

    Ok(Json(SessionResponse {
        user: user.profile(),
        tokens,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

/// Exchange a refresh token for a new pair.
///
/// The presented refresh token is not invalidated and remains usable until
/// its own expiry.
async fn refresh(
    State(state): State<AuthState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let claims = state
        .jwt
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| {
            info!(reason = %e, "Refresh rejected");
            ApiError::unauthorized(AuthErrorKind::from(e).message())
        })?;

    let user = state
        .db
        .users()
        .get_by_id(&claims.sub)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let tokens = state
        .jwt
        .issue_pair(&user.id)
        .internal_err("Failed to issue tokens")?;

    info!(user_id = %user.id, "Tokens refreshed");

    Ok(Json(RefreshResponse { tokens }))
}

#[derive(Serialize)]
struct LogoutResponse {
    success: bool,
}

/// Tokens are stateless, so logout only acknowledges. Clients discard their pair.
async fn logout() -> impl IntoResponse {
    Json(LogoutResponse { success: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+15550001").is_ok());
        assert!(validate_phone("5550001").is_ok());
        assert!(validate_phone("555-0001").is_err());
        assert!(validate_phone("123").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Alice").is_ok());
        assert!(validate_name(&"n".repeat(101)).is_err());
    }
}
