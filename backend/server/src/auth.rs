//! # Sessions
//!
//! HS256 session tokens issued by the POS login. Accepted as a bearer token or
//! a `session` cookie.
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::AppError, state::AppState, utils::session_token};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn issue(&self, sub: &str, role: Option<&str>, ttl: Duration) -> Result<String, AppError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::InternalError(Box::new(e)))?
            .as_secs();

        let claims = SessionClaims {
            sub: sub.to_string(),
            exp: iat + ttl.as_secs(),
            iat,
            role: role.map(str::to_string),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Rejected session token: {e}");
                AppError::Unauthorized
            })
    }
}

/// Extractor for routes that need a logged-in session.
pub struct Session(pub SessionClaims);

impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        state.sessions.verify(token).map(Session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    #[test]
    fn issued_tokens_verify() {
        let keys = SessionKeys::new(SECRET);
        let token = keys
            .issue("cashier-1", Some("cashier"), Duration::from_secs(60))
            .unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "cashier-1");
        assert_eq!(claims.role.as_deref(), Some("cashier"));
    }

    #[test]
    fn foreign_tokens_are_rejected() {
        let issuer = SessionKeys::new("another-secret-that-is-long-enough-too");
        let token = issuer.issue("intruder", None, Duration::from_secs(60)).unwrap();

        let keys = SessionKeys::new(SECRET);
        assert!(matches!(keys.verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = SessionKeys::new(SECRET);
        assert!(matches!(keys.verify("not.a.token"), Err(AppError::Unauthorized)));
    }
}
