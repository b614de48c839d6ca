/**
 * Session Tokens
 *
 * This module handles JWT generation and validation. Tokens are HS256,
 * signed with the configured `JWT_SECRET`, and carry the caller's id and
 * roles.
 */

use crate::backend::auth::identity::Identity;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Tokens expire after 30 days
const TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Roles (e.g. `admin`)
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("invalid user ID in token: {0}")]
    Subject(#[from] uuid::Error),
}

/// Signing and verification keys derived from the JWT secret
#[derive(Clone)]
pub struct SessionKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    /// Create a JWT token for an identity
    pub fn create_token(&self, identity: &Identity) -> Result<String, TokenError> {
        let now = unix_now();
        let claims = Claims {
            sub: identity.id.to_string(),
            roles: identity.roles.clone(),
            exp: now + TOKEN_TTL_SECS,
            iat: now,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(token_data.claims)
    }

    /// Verify a token and build the caller identity from its claims
    pub fn identity_from_token(&self, token: &str) -> Result<Identity, TokenError> {
        let claims = self.verify_token(token)?;
        Ok(Identity {
            id: Uuid::parse_str(&claims.sub)?,
            roles: claims.roles,
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
