//! Credential verification.
//!
//! The registry only needs `verify(credential) -> principal`; issuing tokens
//! is somebody else's job. The shipped implementation validates HS256 JWTs
//! whose `id` claim names the principal, which is what the login service
//! hands to browsers.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::{PresenceError, PresenceResult};
use crate::state::PrincipalId;

/// Validates a bearer credential and yields the principal it belongs to.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, credential: &str) -> PresenceResult<PrincipalId>;
}

/// Payload carried by presence tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub id: String,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: Option<u64>,
}

/// HS256 JWT validator.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Create a validator for tokens signed with `secret`.
    ///
    /// `leeway_secs` tolerates clock skew between the issuer and this host
    /// when checking `exp`.
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify(&self, credential: &str) -> PresenceResult<PrincipalId> {
        match decode::<Claims>(credential, &self.key, &self.validation) {
            Ok(data) if !data.claims.id.is_empty() => Ok(data.claims.id),
            Ok(_) => Err(PresenceError::AuthenticationRejected(
                "token names no principal".to_string(),
            )),
            Err(err) => {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidToken => "invalid token",
                    _ => "token validation failed",
                };
                Err(PresenceError::AuthenticationRejected(reason.to_string()))
            }
        }
    }
}

/// Sign a token the way the login service does.
#[cfg(test)]
pub(crate) fn issue_token(secret: &str, principal: &str, ttl_secs: i64) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        id: principal.to_string(),
        exp: (now + ttl_secs).max(0) as u64,
        iat: Some(now as u64),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encoding")
}

/// Fixed token table for tests.
#[cfg(test)]
pub(crate) struct StaticTokens(std::collections::HashMap<String, PrincipalId>);

#[cfg(test)]
impl StaticTokens {
    pub(crate) fn new(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(token, principal)| (token.to_string(), principal.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
#[async_trait]
impl Authenticator for StaticTokens {
    async fn verify(&self, credential: &str) -> PresenceResult<PrincipalId> {
        self.0
            .get(credential)
            .cloned()
            .ok_or_else(|| PresenceError::AuthenticationRejected("unknown token".to_string()))
    }
}
