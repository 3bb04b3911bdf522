//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Default login attempts per minute per IP.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 10;

/// Default registrations per minute per IP.
pub const DEFAULT_REGISTER_PER_MINUTE: u32 = 5;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for authentication endpoints.
pub struct RateLimitConfig {
    /// Per-IP limiter for login
    pub login: IpLimiter,
    /// Per-IP limiter for registration
    pub register: IpLimiter,
    /// Key on `X-Forwarded-For` instead of the socket address
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Create limiters allowing the given number of requests per minute per IP.
    /// A limit of zero is treated as one.
    pub fn new(login_per_minute: u32, register_per_minute: u32, trust_forwarded_for: bool) -> Self {
        Self {
            login: RateLimiter::keyed(per_minute(login_per_minute)),
            register: RateLimiter::keyed(per_minute(register_per_minute)),
            trust_forwarded_for,
        }
    }
}

fn per_minute(n: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
}

async fn check(limiter: &IpLimiter, trust_forwarded_for: bool, request: Request, next: Next) -> Response {
    let ip = extract_client_ip(&request, trust_forwarded_for);

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            ApiError::too_many_requests("Too many requests. Please try again later.").into_response()
        }
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(&config.login, config.trust_forwarded_for, request, next).await
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(&config.register, config.trust_forwarded_for, request, next).await
}
