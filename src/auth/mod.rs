//! Session credentials: password hashing and signed access/refresh tokens.

use crate::config::AuthConfig;
use anyhow::{Result, anyhow};
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cookie carrying the short-lived access token.
pub const ACCESS_COOKIE: &str = "access_token";

/// Cookie carrying the long-lived refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid or expired token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a user id: {0}")]
    BadSubject(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// Signing keys and lifetimes for both token kinds.
#[derive(Clone)]
pub struct TokenKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

/// A freshly issued token pair.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: String,
    pub refresh: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

impl TokenKeys {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    /// Issue an access/refresh pair for a user.
    pub fn issue(&self, user_id: i64) -> Result<IssuedTokens, TokenError> {
        Ok(IssuedTokens {
            access: sign(user_id, self.access_ttl_secs, &self.access_encoding)?,
            refresh: sign(user_id, self.refresh_ttl_secs, &self.refresh_encoding)?,
            access_ttl_secs: self.access_ttl_secs,
            refresh_ttl_secs: self.refresh_ttl_secs,
        })
    }

    /// Verify an access token, returning the user id it was issued for.
    pub fn verify_access(&self, token: &str) -> Result<i64, TokenError> {
        verify(token, &self.access_decoding)
    }

    /// Verify a refresh token, returning the user id it was issued for.
    pub fn verify_refresh(&self, token: &str) -> Result<i64, TokenError> {
        verify(token, &self.refresh_decoding)
    }
}

fn sign(user_id: i64, ttl_secs: u64, key: &EncodingKey) -> Result<String, TokenError> {
    let iat = chrono::Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        iat,
        exp: iat + ttl_secs,
    };
    Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
}

fn verify(token: &str, key: &DecodingKey) -> Result<i64, TokenError> {
    let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))?;
    data.claims
        .sub
        .parse()
        .map_err(|_| TokenError::BadSubject(data.claims.sub.clone()))
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
