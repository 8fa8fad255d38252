//! Auth gateway: bearer tokens (HS256 JWT) and argon2 password hashes.

use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{Account, Role};
use crate::{CommerceError, Result};

/// Claim structure for bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated account an operation runs on behalf of.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub account_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(account_id: Uuid, role: Role) -> Self { Self { account_id, role } }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(CommerceError::Forbidden("admin role required".into())) }
    }

    /// Admins act on anything; everyone else only on what they own.
    pub fn require_owner_or_admin(&self, owner: Uuid) -> Result<()> {
        if self.is_admin() || self.account_id == owner {
            Ok(())
        } else {
            Err(CommerceError::Forbidden("not the owner of this resource".into()))
        }
    }
}

#[derive(Clone)]
pub struct AuthGateway {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl AuthGateway {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn hash_password(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CommerceError::Internal(format!("password hashing failed: {e}")))
    }

    pub fn verify_password(&self, plain: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is unreadable");
                false
            }
        }
    }

    pub fn issue_token(&self, account: &Account) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims { sub: account.id(), role: account.role(), iat: now, exp: now.saturating_add(ttl) };
        self.sign(&claims)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => CommerceError::Unauthorized("token expired".into()),
                _ => CommerceError::Unauthorized("invalid token".into()),
            })
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| CommerceError::Internal(format!("token signing failed: {e}")))
    }
}
