//! Handshake credential verification for the CampusConnect realtime relay.
//!
//! The relay does not issue credentials. Clients present the same HS256
//! bearer token the Identity Provider mints for REST API calls; the relay
//! only checks the signature and expiry against the shared secret and hands
//! the subject to the User Directory for resolution. A token that fails any
//! check rejects the handshake before a connection exists.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by the Identity Provider's bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the authenticated user's id.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds. Required; a token without it is rejected.
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is missing, malformed, expired, or carries a bad signature
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Verifies a bearer token's signature and expiry against the shared
/// secret and returns its claims.
///
/// # Errors
///
/// * If the token is malformed
/// * If the signature does not match the secret
/// * If the token is expired or has no expiry
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;

    log::debug!("Verified token for {}", data.claims.sub);

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use pretty_assertions::assert_eq;

    const SECRET: &str = "test-shared-secret";

    fn token(secret: &str, sub: &str, expires_in: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            iat: now,
            exp: now + expires_in,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_resolves_subject() {
        let token = token(SECRET, "u1", 900);

        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // well past the default validation leeway
        let token = token(SECRET, "u1", -3600);

        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = token("some-other-secret", "u1", 900);

        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(verify_token(SECRET, "not-a-jwt").is_err());
    }

    #[test]
    fn test_token_without_expiry_is_rejected() {
        // hand-rolled claims with no exp field
        #[derive(Serialize)]
        struct NoExpiry<'a> {
            sub: &'a str,
            iat: i64,
        }

        let claims = NoExpiry {
            sub: "u1",
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verify_token(SECRET, &token).is_err());
    }
}
