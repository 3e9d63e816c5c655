//! Email verification tokens.
//!
//! Signed with the session secret but carrying a distinct `purpose` and no
//! permission snapshot, so neither kind of token is accepted in place of the
//! other. The token is bound to the email it was minted for; changing the
//! address invalidates any outstanding token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gatehouse_core::UserId;

use crate::claims::{TokenValidationError, check_window, time_window};
use crate::token::{Hs256Tokens, TokenError, sign};

pub const VERIFY_EMAIL_PURPOSE: &str = "verify_email";
pub const VERIFICATION_TTL_HOURS: u32 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationClaims {
    #[serde(rename = "userId")]
    pub user_id: UserId,

    pub email: String,

    pub purpose: String,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl VerificationClaims {
    pub fn new(user_id: UserId, email: impl Into<String>, now: DateTime<Utc>) -> Result<Self, TokenValidationError> {
        let (issued_at, expires_at) = time_window(now, VERIFICATION_TTL_HOURS)?;
        Ok(Self {
            user_id,
            email: email.into(),
            purpose: VERIFY_EMAIL_PURPOSE.to_string(),
            issued_at,
            expires_at,
        })
    }
}

/// Mints and checks email verification tokens.
pub trait VerificationTokens: Send + Sync {
    fn issue_verification(&self, user_id: UserId, email: &str, now: DateTime<Utc>) -> Result<String, TokenError>;

    fn validate_verification(&self, token: &str, now: DateTime<Utc>) -> Result<VerificationClaims, TokenError>;
}

impl VerificationTokens for Hs256Tokens {
    fn issue_verification(&self, user_id: UserId, email: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        sign(&self.encoding, &VerificationClaims::new(user_id, email, now)?)
    }

    fn validate_verification(&self, token: &str, now: DateTime<Utc>) -> Result<VerificationClaims, TokenError> {
        let claims = self.decode::<VerificationClaims>(token)?;
        if claims.purpose != VERIFY_EMAIL_PURPOSE {
            return Err(TokenValidationError::WrongPurpose.into());
        }
        check_window(claims.issued_at, claims.expires_at, now)?;
        Ok(claims)
    }
}
