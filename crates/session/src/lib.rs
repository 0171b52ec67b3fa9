//! Session tokens for the operations dashboard.
//!
//! The backend issues HS256-signed tokens (`header.payload.signature`, each
//! segment base64url without padding). The gateway never trusts the backend at
//! request time: it re-verifies the cookie on every dashboard request by
//! recomputing the HMAC-SHA256 signature over `header.payload` with the shared
//! secret. Any defect in the token rejects it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::domain::Role;
use thiserror::Error;

/// Cookie the signed token travels in.
pub const AUTH_COOKIE_NAME: &str = "auth_token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl SessionClaims {
    pub fn new(sub: impl Into<String>, role: Role) -> Self {
        Self {
            sub: sub.into(),
            role,
            user_id: None,
            exp: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn expiring(mut self, now: DateTime<Utc>, ttl: Duration) -> Self {
        self.exp = Some((now + ttl).timestamp());
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-segment signed token")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired at unix timestamp {0}")]
    Expired(i64),
}

/// Mint an HS256 token carrying the given claims.
pub fn mint_token(
    secret: &str,
    claims: &SessionClaims,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a token and return its claims unchanged.
///
/// Fails closed: wrong segment count, undecodable segments, signature
/// mismatch, unparseable claims, and past expiry all reject. The signature is
/// checked before the payload is ever parsed.
pub fn verify_token(
    secret: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<SessionClaims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(TokenError::Malformed);
    };

    let presented = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::BadSignature)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| TokenError::BadSignature)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&presented)
        .map_err(|_| TokenError::BadSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: SessionClaims =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Malformed)?;

    if let Some(exp) = claims.exp {
        if now.timestamp() > exp {
            return Err(TokenError::Expired(exp));
        }
    }

    Ok(claims)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
