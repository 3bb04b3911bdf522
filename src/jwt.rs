//! JWT token issuing and verification.
//!
//! Two independent HS256 secrets back two token kinds:
//! - Access tokens: short-lived (1 hour), authorize individual API calls
//! - Refresh tokens: long-lived (7 days), only exchanged for a new pair
//!
//! Both kinds are stateless. Rotation on refresh mints a fresh pair but does
//! not invalidate the previous refresh token, which stays usable until its own
//! expiry. There is no revocation list.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Access token duration: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Claims carried by both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Unique token id, keeps two tokens minted in the same second distinct
    pub jti: String,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Access and refresh tokens, always issued together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signing and verification keys for one token kind.
#[derive(Clone)]
struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    duration: u64,
}

impl TokenKeys {
    fn new(secret: &[u8], duration: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            duration,
        }
    }

    fn issue(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        let now = now_secs()?;
        let exp = now + self.duration;

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
            duration: self.duration,
        })
    }

    fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::from)
    }
}

/// Token issuer holding the access and refresh secrets.
#[derive(Clone)]
pub struct JwtConfig {
    access: TokenKeys,
    refresh: TokenKeys,
}

impl JwtConfig {
    /// Create an issuer with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_lifetimes(
            access_secret,
            refresh_secret,
            ACCESS_TOKEN_DURATION_SECS,
            REFRESH_TOKEN_DURATION_SECS,
        )
    }

    /// Create an issuer with explicit token lifetimes in seconds.
    pub fn with_lifetimes(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_secs: u64,
        refresh_secs: u64,
    ) -> Self {
        Self {
            access: TokenKeys::new(access_secret, access_secs),
            refresh: TokenKeys::new(refresh_secret, refresh_secs),
        }
    }

    /// Sign an access token for the given identity.
    pub fn issue_access_token(&self, identity_id: &str) -> Result<IssuedToken, JwtError> {
        self.access.issue(identity_id)
    }

    /// Sign a refresh token for the given identity.
    pub fn issue_refresh_token(&self, identity_id: &str) -> Result<IssuedToken, JwtError> {
        self.refresh.issue(identity_id)
    }

    /// Sign a new access/refresh pair. Used by login, registration and refresh.
    pub fn issue_pair(&self, identity_id: &str) -> Result<TokenPair, JwtError> {
        let access = self.issue_access_token(identity_id)?;
        let refresh = self.issue_refresh_token(identity_id)?;
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.access.verify(token)
    }

    /// Verify a refresh token's signature and expiry.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.refresh.verify(token)
    }
}

fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur while issuing or verifying tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwtError {
    /// The token's expiry has passed
    #[error("token expired")]
    Expired,
    /// Bad signature, bad structure or bad encoding
    #[error("token malformed")]
    Malformed,
    /// Any other verification problem
    #[error("token verification failed: {0}")]
    VerificationFailed(String),
    /// Error encoding the token
    #[error("failed to encode token: {0}")]
    Encoding(String),
    /// System time error
    #[error("system time error")]
    TimeError,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => JwtError::Malformed,
            _ => JwtError::VerificationFailed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS: &[u8] = b"access-secret-key-for-testing-000000";
    const REFRESH: &[u8] = b"refresh-secret-key-for-testing-11111";

    fn issuer() -> JwtConfig {
        JwtConfig::new(ACCESS, REFRESH)
    }

    fn forge(secret: &[u8], sub: &str, iat: u64, exp: u64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            iat,
            exp,
            jti: "forged".to_string(),
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let config = issuer();

        let result = config.issue_access_token("uuid-123").unwrap();
        assert_eq!(result.duration, ACCESS_TOKEN_DURATION_SECS);

        let claims = config.verify_access(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.exp, result.expires_at);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_DURATION_SECS);
    }

    #[test]
    fn test_issue_and_verify_refresh_token() {
        let config = issuer();

        let result = config.issue_refresh_token("uuid-123").unwrap();
        assert_eq!(result.duration, REFRESH_TOKEN_DURATION_SECS);

        let claims = config.verify_refresh(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.exp - claims.iat, REFRESH_TOKEN_DURATION_SECS);
    }

    #[test]
    fn test_pair_round_trips_subject() {
        let config = issuer();

        for id in ["a", "0b7c1c5e-8f5a-4c65-9a53-1f7f1f4b2b11", "user-with-dashes"] {
            let pair = config.issue_pair(id).unwrap();
            assert_eq!(config.verify_access(&pair.access_token).unwrap().sub, id);
            assert_eq!(config.verify_refresh(&pair.refresh_token).unwrap().sub, id);
        }
    }

    #[test]
    fn test_cross_secret_rejected() {
        let config = issuer();
        let pair = config.issue_pair("uuid-123").unwrap();

        assert_eq!(
            config.verify_refresh(&pair.access_token),
            Err(JwtError::Malformed)
        );
        assert_eq!(
            config.verify_access(&pair.refresh_token),
            Err(JwtError::Malformed)
        );
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let now = now_secs().unwrap();
        let token = forge(ACCESS, "uuid-123", now - 100, now - 50);

        assert_eq!(issuer().verify_access(&token), Err(JwtError::Expired));
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let config = issuer();
        assert_eq!(config.verify_access("invalid-token"), Err(JwtError::Malformed));
        assert_eq!(config.verify_access("a.b.c"), Err(JwtError::Malformed));
    }

    #[test]
    fn test_tampered_payload_is_malformed() {
        let config = issuer();
        let token = config.issue_access_token("uuid-123").unwrap().token;
        let other = config.issue_access_token("uuid-456").unwrap().token;

        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);

        assert_eq!(config.verify_access(&spliced), Err(JwtError::Malformed));
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig::new(b"secret-1", b"secret-r");
        let config2 = JwtConfig::new(b"secret-2", b"secret-r");

        let result = config1.issue_access_token("uuid-123").unwrap();
        assert!(config2.verify_access(&result.token).is_err());
    }

    #[test]
    fn test_pairs_are_unique() {
        let config = issuer();
        let first = config.issue_pair("uuid-123").unwrap();
        let second = config.issue_pair("uuid-123").unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn test_custom_lifetimes() {
        let config = JwtConfig::with_lifetimes(ACCESS, REFRESH, 900, 3600);
        let claims = config
            .verify_access(&config.issue_access_token("u").unwrap().token)
            .unwrap();
        assert_eq!(claims.exp - claims.iat, 900);

        let refresh = config.issue_refresh_token("u").unwrap();
        assert_eq!(refresh.duration, 3600);
    }

    #[test]
    fn test_token_pair_serializes_camel_case() {
        let pair = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }
}
