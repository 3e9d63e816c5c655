use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::{RoleId, UserId};

use crate::Permission;

/// Session token claims.
///
/// The permission list is a snapshot of the role's permissions at issuance
/// time. It is authoritative for the token's lifetime and is never refreshed
/// from storage while the token is being validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject / user identifier.
    #[serde(rename = "userId")]
    pub user_id: UserId,

    /// Role the user held when the token was minted.
    pub role: RoleId,

    /// Permission snapshot copied from the role.
    pub permissions: Vec<Permission>,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Build claims valid for `ttl_hours` from `now`.
    ///
    /// Timestamps are truncated to whole seconds, which is the precision the
    /// encoded token carries. A lifetime that overflows the calendar is an
    /// [`TokenValidationError::InvalidTimeWindow`].
    pub fn new(
        user_id: UserId,
        role: RoleId,
        permissions: Vec<Permission>,
        ttl_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, TokenValidationError> {
        let (issued_at, expires_at) = time_window(now, ttl_hours)?;
        Ok(Self {
            user_id,
            role,
            permissions,
            issued_at,
            expires_at,
        })
    }
}

/// `(issued_at, expires_at)` for a token minted at `now` that lives `ttl_hours`.
pub(crate) fn time_window(
    now: DateTime<Utc>,
    ttl_hours: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), TokenValidationError> {
    let issued_at = truncate_to_seconds(now);
    let expires_at = Duration::try_hours(i64::from(ttl_hours))
        .and_then(|ttl| issued_at.checked_add_signed(ttl))
        .ok_or(TokenValidationError::InvalidTimeWindow)?;
    Ok((issued_at, expires_at))
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("token was not issued for this purpose")]
    WrongPurpose,
}

/// Deterministically validate session claims against `now`.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// [`crate::token`] before the claims are trusted.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    check_window(claims.issued_at, claims.expires_at, now)
}

pub(crate) fn check_window(
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if expires_at <= issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;

    fn claims(now: DateTime<Utc>, ttl_hours: u32) -> SessionClaims {
        SessionClaims::new(UserId::new(1), RoleId::new(1), vec![builtin::ROLES_LIST], ttl_hours, now)
            .unwrap()
    }

    #[test]
    fn expiry_is_issuance_plus_ttl_hours() {
        let now = Utc::now();
        let c = claims(now, 10);
        assert_eq!(c.expires_at - c.issued_at, Duration::hours(10));
        assert!(c.issued_at <= now);
    }

    #[test]
    fn accepted_just_before_expiry_and_rejected_just_after() {
        let now = Utc::now();
        let c = claims(now, 2);
        let eps = Duration::seconds(1);

        assert_eq!(validate_claims(&c, c.expires_at - eps), Ok(()));
        assert_eq!(validate_claims(&c, c.expires_at), Err(TokenValidationError::Expired));
        assert_eq!(
            validate_claims(&c, c.expires_at + eps),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn rejects_future_issued_tokens() {
        let now = Utc::now();
        let c = claims(now + Duration::minutes(5), 1);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn rejects_empty_time_window() {
        let c = claims(Utc::now(), 0);
        assert_eq!(
            validate_claims(&c, c.issued_at),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn oversized_lifetime_is_an_invalid_window() {
        let err = SessionClaims::new(UserId::new(1), RoleId::new(1), vec![], u32::MAX, Utc::now())
            .unwrap_err();
        assert_eq!(err, TokenValidationError::InvalidTimeWindow);
    }

    #[test]
    fn wire_names_match_the_token_format() {
        let c = claims(Utc::now(), 1);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["userId"], 1);
        assert_eq!(json["role"], 1);
        assert_eq!(json["permissions"][0], "roles:list");
        assert!(json["exp"].is_i64());
        assert!(json["iat"].is_i64());
    }
}
