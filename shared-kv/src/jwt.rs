//! JWT pre-validation shared by the gateway's proxy pipeline (C5) and the
//! fanout plane's WebSocket upgrade handler (C4).
//!
//! This is pre-validation, not authorization: it checks signature and
//! expiry and resolves `(userId, role)` so the caller can short-circuit an
//! expired or tampered token before it reaches a downstream service or
//! accepts a socket upgrade. Fine-grained authorization stays with the
//! downstream service.

use crate::error::{KvError, Result};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims this platform's tokens carry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the authenticated user's id.
    pub sub: String,
    /// The user's role (`student`, `trainer`, `admin`), consulted by the
    /// rate limiter's budget selection and the fanout visibility filter.
    pub role: String,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// The resolved identity of a pre-validated token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// The authenticated user's id.
    pub user_id: String,
    /// The user's role.
    pub role: String,
}

/// Verifies bearer tokens against a shared HMAC secret.
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Build a validator over `secret`, the platform's `JWT_SECRET`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(jsonwebtoken::Algorithm::HS256),
        }
    }

    /// Verify `token`'s signature and expiry, resolving its claims.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::InvalidToken`] for any signature, expiry, or
    /// claim-shape failure; callers surface this as 401 and never retry.
    pub fn validate(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| KvError::InvalidToken(e.to_string()))?;

        Ok(Identity { user_id: data.claims.sub, role: data.claims.role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[allow(clippy::expect_used)]
    fn token_for(secret: &str, claims: &Claims) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
            .expect("test token encodes")
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn validates_a_well_formed_token() {
        let secret = "test-secret";
        let validator = JwtValidator::new(secret);
        let claims = Claims {
            sub: "student-1".to_string(),
            role: "student".to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = token_for(secret, &claims);

        let identity = validator.validate(&token).unwrap();
        assert_eq!(identity.user_id, "student-1");
        assert_eq!(identity.role, "student");
    }

    #[test]
    fn rejects_an_expired_token() {
        let secret = "test-secret";
        let validator = JwtValidator::new(secret);
        let claims = Claims {
            sub: "student-1".to_string(),
            role: "student".to_string(),
            exp: chrono::Utc::now().timestamp() - 3600,
        };
        let token = token_for(secret, &claims);

        assert!(matches!(validator.validate(&token), Err(KvError::InvalidToken(_))));
    }

    #[test]
    fn rejects_a_token_signed_with_a_different_secret() {
        let validator = JwtValidator::new("right-secret");
        let claims = Claims {
            sub: "student-1".to_string(),
            role: "student".to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = token_for("wrong-secret", &claims);

        assert!(matches!(validator.validate(&token), Err(KvError::InvalidToken(_))));
    }
}
