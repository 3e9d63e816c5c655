//! Session token minting and verification (HS256 JWT).
//!
//! Tokens are stateless: the server keeps no record of issued tokens, and
//! expiry is the only way a token stops being accepted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use gatehouse_core::{RoleId, UserId};

use crate::claims::{SessionClaims, TokenValidationError, validate_claims};
use crate::Permission;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Key or algorithm failure while minting. Indicates misconfiguration.
    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

impl TokenError {
    /// True for every failure a client can cause by presenting a bad token.
    pub fn is_authentication_failure(&self) -> bool {
        !matches!(self, TokenError::Signing(_))
    }
}

/// Mints session tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue(
        &self,
        subject: UserId,
        role: RoleId,
        ttl_hours: u32,
        permissions: Vec<Permission>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError>;
}

/// Verifies a presented token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError>;
}

/// Mint a token signed with `secret`.
pub fn issue_token(
    secret: &[u8],
    subject: UserId,
    role: RoleId,
    ttl_hours: u32,
    permissions: Vec<Permission>,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let key = EncodingKey::from_secret(secret);
    encode(&key, SessionClaims::new(subject, role, permissions, ttl_hours, now)?)
}

fn encode(key: &EncodingKey, claims: SessionClaims) -> Result<String, TokenError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow.into());
    }
    sign(key, &claims)
}

pub(crate) fn sign<T: Serialize>(key: &EncodingKey, claims: &T) -> Result<String, TokenError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| TokenError::Signing(e.to_string()))
}

/// HS256 issuer/validator keyed by a server-held secret.
///
/// Keys are derived once; the struct is immutable and shared across requests.
pub struct Hs256Tokens {
    pub(crate) encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for Hs256Tokens {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Tokens").finish_non_exhaustive()
    }
}

impl Hs256Tokens {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();

        // Expiry is checked by `validate_claims` against a caller-supplied clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify the signature and decode the payload. Time checks are the caller's.
    pub(crate) fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        jsonwebtoken::decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

impl TokenIssuer for Hs256Tokens {
    fn issue(
        &self,
        subject: UserId,
        role: RoleId,
        ttl_hours: u32,
        permissions: Vec<Permission>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        encode(
            &self.encoding,
            SessionClaims::new(subject, role, permissions, ttl_hours, now)?,
        )
    }
}

impl JwtValidator for Hs256Tokens {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let claims = self.decode::<SessionClaims>(token)?;
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}
