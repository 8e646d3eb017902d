//! Handshake authentication seam.
//!
//! A connection supplies a credential token out-of-band (the `token` query
//! parameter on the WebSocket upgrade, or a bearer header on HTTP). The
//! [`Authenticator`] turns it into a verified [`PrincipalId`] or refuses
//! the connection.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use gather_core::ids::PrincipalId;

/// Handshake failure.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("missing credential token")]
    MissingToken,
    /// The credential did not verify.
    #[error("invalid credential token")]
    InvalidToken,
}

/// Produces a verified principal identity from a credential token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `token` and return the owning principal.
    async fn verify(&self, token: &str) -> Result<PrincipalId, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// HS256 JWT verifier. The subject claim is the principal id.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtAuthenticator {
    /// Create a verifier from a shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `principal`, valid for `ttl_secs` seconds.
    ///
    /// Used by tests and local tooling; production tokens come from the
    /// external credential issuer.
    pub fn issue(
        &self,
        principal: &PrincipalId,
        ttl_secs: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: principal.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify(&self, token: &str) -> Result<PrincipalId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(PrincipalId::from(data.claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> JwtAuthenticator {
        JwtAuthenticator::new("test-secret")
    }

    #[tokio::test]
    async fn issue_then_verify_roundtrip() {
        let auth = auth();
        let principal = PrincipalId::from("alice");
        let token = auth.issue(&principal, 60).unwrap();
        let verified = auth.verify(&token).await.unwrap();
        assert_eq!(verified, principal);
    }

    #[tokio::test]
    async fn empty_token_is_missing() {
        let err = auth().verify("").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let err = auth().verify("not.a.jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let auth = auth();
        let token = auth.issue(&PrincipalId::from("alice"), -120).unwrap();
        let err = auth.verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_invalid() {
        let other = JwtAuthenticator::new("other-secret");
        let token = other.issue(&PrincipalId::from("alice"), 60).unwrap();
        let err = auth().verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
