//! JWT Token Handler
//! Mission: Generate and validate access/refresh token pairs

use crate::auth::error::AccountError;
use crate::auth::models::{Claims, TokenType, User};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_ACCESS_LIFETIME_SECS: i64 = 5 * 60;
pub const DEFAULT_REFRESH_LIFETIME_SECS: i64 = 24 * 3600;

/// Validity windows for the two token types
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::seconds(DEFAULT_ACCESS_LIFETIME_SECS),
            refresh: Duration::seconds(DEFAULT_REFRESH_LIFETIME_SECS),
        }
    }
}

/// Freshly signed pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// JWT Handler for token operations
pub struct JwtHandler {
    secret: String,
    lifetimes: TokenLifetimes,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and default lifetimes
    pub fn new(secret: String) -> Self {
        Self::with_lifetimes(secret, TokenLifetimes::default())
    }

    pub fn with_lifetimes(secret: String, lifetimes: TokenLifetimes) -> Self {
        Self { secret, lifetimes }
    }

    /// Configured validity window of access tokens
    pub fn access_lifetime(&self) -> Duration {
        self.lifetimes.access
    }

    fn lifetime_of(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.lifetimes.access,
            TokenType::Refresh => self.lifetimes.refresh,
        }
    }

    /// Generate a signed token of the given type for a user
    pub fn generate_token(&self, user: &User, token_type: TokenType) -> Result<String, AccountError> {
        let now = Utc::now();
        let lifetime = self.lifetime_of(token_type);
        let claims = Claims {
            token_type,
            sub: user.id.to_string(),
            email: user.email.clone(),
            user_typ: user.user_typ,
            iat: now.timestamp() as usize,
            exp: (now + lifetime).timestamp() as usize,
            jti: Uuid::new_v4().simple().to_string(),
        };

        debug!(
            "Generating {:?} JWT for user {} ({}), expires in {}s",
            token_type,
            user.email,
            user.id,
            lifetime.num_seconds()
        );

        self.sign(&claims)
    }

    pub fn generate_pair(&self, user: &User) -> Result<TokenPair, AccountError> {
        Ok(TokenPair {
            access: self.generate_token(user, TokenType::Access)?,
            refresh: self.generate_token(user, TokenType::Refresh)?,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, AccountError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(AccountError::TokenEncoding)
    }

    /// Validate a JWT token of the expected type and extract claims
    pub fn validate_token(&self, token: &str, expected: TokenType) -> Result<Claims, AccountError> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!("Rejected JWT: {e}");
            AccountError::InvalidToken
        })?;

        if decoded.claims.token_type != expected {
            debug!(
                "Rejected JWT: expected {:?}, got {:?}",
                expected, decoded.claims.token_type
            );
            return Err(AccountError::InvalidToken);
        }

        debug!("Validated JWT for user {}", decoded.claims.email);

        Ok(decoded.claims)
    }
}
