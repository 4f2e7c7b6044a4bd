use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use garrison_core::{BaseId, UserId};

use crate::Role;

/// JWT claims model (transport-agnostic).
///
/// The claims the ledger expects once a token has been decoded and its
/// signature verified by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    pub role: Role,

    /// Base the user is assigned to. Required for non-admin roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_id: Option<BaseId>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("role '{0}' requires an assigned base")]
    MissingBaseAssignment(String),
}

/// Deterministically validate JWT claims.
///
/// Signature verification / decoding happens outside this crate.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    if !claims.role.is_global() && claims.base_id.is_none() {
        return Err(TokenValidationError::MissingBaseAssignment(
            claims.role.as_str().to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(role: Role, base_id: Option<BaseId>) -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: UserId::new(),
            role,
            base_id,
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn admin_without_base_is_valid() {
        assert!(validate_claims(&claims(Role::ADMIN, None), Utc::now()).is_ok());
    }

    #[test]
    fn commander_without_base_is_rejected() {
        let err = validate_claims(&claims(Role::BASE_COMMANDER, None), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TokenValidationError::MissingBaseAssignment("base_commander".into())
        );
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let c = claims(Role::ADMIN, None);
        let later = c.expires_at + Duration::seconds(1);
        assert_eq!(validate_claims(&c, later), Err(TokenValidationError::Expired));
    }

    #[test]
    fn claims_roundtrip_through_json() {
        let c = claims(Role::LOGISTICS_OFFICER, Some(BaseId::new()));
        let json = serde_json::to_string(&c).unwrap();
        let back: JwtClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
