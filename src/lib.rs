pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::Router;
use db::Database;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: u64,
    /// Whether new user signups are disabled
    pub no_signup: bool,
    /// Take the client IP from X-Forwarded-For (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    /// Login attempts allowed per minute per IP
    pub login_per_minute: u32,
    /// Registrations allowed per minute per IP
    pub register_per_minute: u32,
}

impl ServerConfig {
    /// Config with default lifetimes and rate limits.
    pub fn new(db: Database, access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_token_ttl: jwt::ACCESS_TOKEN_DURATION_SECS,
            refresh_token_ttl: jwt::REFRESH_TOKEN_DURATION_SECS,
            no_signup: false,
            trust_forwarded_for: false,
            login_per_minute: rate_limit::DEFAULT_LOGIN_PER_MINUTE,
            register_per_minute: rate_limit::DEFAULT_REGISTER_PER_MINUTE,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_lifetimes(
        &config.access_secret,
        &config.refresh_secret,
        config.access_token_ttl,
        config.refresh_token_ttl,
    ));

    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.login_per_minute,
        config.register_per_minute,
        config.trust_forwarded_for,
    ));

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        config.no_signup,
        rate_limit_config,
    );

    Router::new().nest("/api", api_router)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
