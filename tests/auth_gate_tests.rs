//! Tests for the bearer-token authorization gate.
//!
//! Tests cover:
//! - Missing, non-Bearer and empty Authorization headers
//! - Expired, malformed and cross-secret access tokens
//! - Identities deleted after their token was issued
//! - Role restriction on admin endpoints

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use keyward::db::UserRole;

#[tokio::test]
async fn test_valid_token_passes_gate() {
    let (app, db, jwt) = create_test_app().await;
    let (user, pair) =
        create_authenticated_user(&db, &jwt, "alice@example.com", UserRole::User).await;

    let (status, body) = call(&app, get("/api/users/me", Some(&pair.access_token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user.id.as_str());
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["role"], "user");
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_missing_header_rejected() {
    let (app, _, _) = create_test_app().await;

    let (status, body) = call(&app, get("/api/users/me", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "no token provided");
    assert_eq!(body["code"], "NO_TOKEN");
}

#[tokio::test]
async fn test_header_without_bearer_prefix_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let (_, pair) =
        create_authenticated_user(&db, &jwt, "alice@example.com", UserRole::User).await;

    for value in [
        pair.access_token.clone(),
        format!("Token {}", pair.access_token),
        "Bearer ".to_string(),
    ] {
        let request = Request::builder()
            .uri("/api/users/me")
            .header("authorization", value)
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "no token provided");
    }
}

#[tokio::test]
async fn test_expired_token_rejected_with_reason() {
    let (app, db, _) = create_test_app().await;
    let user = create_user(&db, "alice@example.com", UserRole::User).await;
    let expired = forge_expired(ACCESS_SECRET, &user.id);

    let (status, body) = call(&app, get("/api/users/me", Some(&expired))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token expired");
    assert_eq!(body["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_malformed_token_rejected_with_reason() {
    let (app, _, _) = create_test_app().await;

    let (status, body) = call(&app, get("/api/users/me", Some("not-a-jwt"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token malformed");
}

#[tokio::test]
async fn test_refresh_token_not_accepted_as_access_token() {
    let (app, db, jwt) = create_test_app().await;
    let (_, pair) =
        create_authenticated_user(&db, &jwt, "alice@example.com", UserRole::User).await;

    let (status, body) = call(&app, get("/api/users/me", Some(&pair.refresh_token))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token malformed");
}

#[tokio::test]
async fn test_deleted_user_rejected() {
    let (app, db, jwt) = create_test_app().await;
    let (user, pair) =
        create_authenticated_user(&db, &jwt, "alice@example.com", UserRole::User).await;

    assert!(db.users().delete(&user.id).await.unwrap());

    // Token is still cryptographically valid, but its subject is gone
    let (status, body) = call(&app, get("/api/users/me", Some(&pair.access_token))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "user not found");
    assert_eq!(body["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_admin_endpoint_rejects_regular_user() {
    let (app, db, jwt) = create_test_app().await;
    let (_, pair) =
        create_authenticated_user(&db, &jwt, "alice@example.com", UserRole::User).await;

    let (status, body) = call(&app, get("/api/admin/users", Some(&pair.access_token))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "admin privileges required");
}

#[tokio::test]
async fn test_admin_endpoint_accepts_admin() {
    let (app, db, jwt) = create_test_app().await;
    let (_, pair) =
        create_authenticated_user(&db, &jwt, "root@example.com", UserRole::Admin).await;

    let (status, body) = call(&app, get("/api/admin/users", Some(&pair.access_token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_authentication_checked_before_role() {
    let (app, db, _) = create_test_app().await;
    let admin = create_user(&db, "root@example.com", UserRole::Admin).await;

    let (status, _) = call(&app, get("/api/admin/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = forge_expired(ACCESS_SECRET, &admin.id);
    let (status, body) = call(&app, get("/api/admin/users", Some(&expired))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token expired");
}

#[tokio::test]
async fn test_role_read_from_store_not_token() {
    let (app, db, jwt) = create_test_app().await;
    let (user, pair) =
        create_authenticated_user(&db, &jwt, "alice@example.com", UserRole::User).await;

    db.users().set_role(&user.id, UserRole::Admin).await.unwrap();

    // Same token, promoted user
    let (status, _) = call(&app, get("/api/admin/users", Some(&pair.access_token))).await;
    assert_eq!(status, StatusCode::OK);
}
