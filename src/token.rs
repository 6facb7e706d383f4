use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::error::AuthError;

/// Claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    pub uid: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(thiserror::Error, Debug)]
#[error("token signing failed: {0}")]
pub struct TokenError(#[from] jsonwebtoken::errors::Error);

/// Issues and validates stateless bearer tokens. Holds no per-token state.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl_minutes: i64,
    clock: SharedClock,
}

impl TokenService {
    pub fn new(secret: &[u8], algorithm: Algorithm, ttl_minutes: i64, clock: SharedClock) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm,
            ttl_minutes,
            clock,
        }
    }

    pub fn from_config(cfg: &AppConfig, clock: SharedClock) -> Self {
        Self::new(cfg.jwt_secret.as_bytes(), cfg.jwt_algorithm, cfg.token_ttl_minutes, clock)
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    pub fn issue(&self, subject: &str, user_id: i64) -> Result<String, TokenError> {
        self.issue_with_ttl(subject, user_id, self.ttl_minutes)
    }

    pub fn issue_with_ttl(&self, subject: &str, user_id: i64, ttl_minutes: i64) -> Result<String, TokenError> {
        let now = self.clock.now_unix();
        let claims = TokenClaims {
            sub: subject.to_string(),
            uid: user_id,
            iat: now,
            exp: now.saturating_add(ttl_minutes.saturating_mul(60)),
        };
        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding)?)
    }

    /// Checks signature, algorithm and expiry. Every failure is reported as
    /// the same `Unauthorized`; the concrete cause only reaches debug logs.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        // header alg must be exactly the configured one
        let mut validation = Validation::new(self.algorithm);
        // expiry is checked below against the injected clock, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                AuthError::Unauthorized
            })?
            .claims;

        let now = self.clock.now_unix();
        if now >= claims.exp {
            debug!(exp = claims.exp, now, "token rejected: expired");
            return Err(AuthError::Unauthorized);
        }
        Ok(claims)
    }
}
