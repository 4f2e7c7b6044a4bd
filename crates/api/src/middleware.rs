use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use thiserror::Error;

use garrison_auth::{JwtClaims, Principal, TokenValidationError, validate_claims};

use crate::context::PrincipalContext;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Rejected(#[from] TokenValidationError),
}

/// Turns a bearer token into validated claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// HMAC-SHA256 tokens signed with a shared secret.
///
/// Time-window checks are done by `validate_claims` on the typed
/// `issued_at`/`expires_at` claims, not by the JWT library.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut()
        .insert(PrincipalContext::new(Principal::from_claims(&claims)));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
