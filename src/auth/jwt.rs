//! JWT issuance
//!
//! Tokens are anchored to the challenge: `iat` is the challenge's `minTime`
//! and `exp` is `iat` plus the configured duration. The wall clock at issue
//! time plays no part.

use std::str::FromStr;

use chrono::Duration;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Claims carried by an issued token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    /// Client account id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Key material for signing tokens
#[derive(Clone)]
pub struct TokenSigningKey {
    algorithm: Algorithm,
    material: String,
}

impl TokenSigningKey {
    /// `material` is a shared secret for HMAC algorithms and a PEM private key otherwise
    pub fn new(algorithm: Algorithm, material: String) -> Self {
        Self {
            algorithm,
            material,
        }
    }

    pub fn parse_algorithm(name: &str) -> Result<Algorithm, JwtError> {
        Algorithm::from_str(name.trim()).map_err(|_| JwtError::UnsupportedAlgorithm(name.to_string()))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn encoding_key(&self) -> Result<EncodingKey, JwtError> {
        let pem = self.material.as_bytes();
        let key = match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Ok(EncodingKey::from_secret(pem))
            }
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem),
        };
        key.map_err(|e| JwtError::InvalidKey(e.to_string()))
    }
}

impl std::fmt::Debug for TokenSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Mints tokens for verified client accounts
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    issuer: String,
    key: TokenSigningKey,
    expires_in: Duration,
}

impl TokenIssuer {
    pub fn new(issuer: String, key: TokenSigningKey, expires_in: Duration) -> Self {
        Self {
            issuer,
            key,
            expires_in,
        }
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// Sign a token for `subject` issued at `issued_at` (unix seconds)
    pub fn issue(&self, subject: &str, issued_at: i64) -> Result<IssuedToken, JwtError> {
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at
                .checked_add(self.expires_in.num_seconds())
                .ok_or_else(|| JwtError::EncodingFailed("expiry is out of range".to_string()))?,
        };

        let encoding_key = self.key.encoding_key()?;
        let token = encode(&Header::new(self.key.algorithm), &claims, &encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }
}
