#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use keyward::{
    ServerConfig, create_app,
    db::{Database, NewUser, User, UserRole},
    jwt::{Claims, JwtConfig, TokenPair},
};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery";

/// Config with test secrets and limits high enough not to interfere.
pub fn test_config(db: Database) -> ServerConfig {
    let mut config = ServerConfig::new(db, ACCESS_SECRET, REFRESH_SECRET);
    config.login_per_minute = 1000;
    config.register_per_minute = 1000;
    config
}

/// Create a test app and return (app, db, jwt_config).
pub async fn create_test_app() -> (Router, Database, JwtConfig) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let app = create_app(&test_config(db.clone()));
    (app, db, JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET))
}

/// Insert a user directly into the store.
pub async fn create_user(db: &Database, email: &str, role: UserRole) -> User {
    db.users()
        .create(NewUser {
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            phone: None,
            password: PASSWORD.to_string(),
            role,
            image: None,
        })
        .await
        .expect("Failed to create user")
}

/// Insert a user and sign a pair for them.
pub async fn create_authenticated_user(
    db: &Database,
    jwt: &JwtConfig,
    email: &str,
    role: UserRole,
) -> (User, TokenPair) {
    let user = create_user(db, email, role).await;
    let pair = jwt.issue_pair(&user.id).unwrap();
    (user, pair)
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Sign a token with `secret` whose expiry is already in the past.
pub fn forge_expired(secret: &[u8], sub: &str) -> String {
    let now = now_secs();
    let claims = Claims {
        sub: sub.to_string(),
        iat: now - 7200,
        exp: now - 3600,
        jti: uuid::Uuid::new_v4().to_string(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .unwrap()
}

pub fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

/// Send one request and return (status, JSON body).
pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}
