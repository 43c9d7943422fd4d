//! Token issuance
//!
//! Login and refresh both answer with the access token's lifetime so clients
//! can schedule their next refresh without decoding the JWT.

use crate::auth::error::AccountError;
use crate::auth::models::TokenType;
use crate::auth::AuthState;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct TokenObtainRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenObtainResponse {
    pub refresh: String,
    pub access: String,
    pub lifetime: i64, // seconds the access token stays valid
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct TokenRefreshResponse {
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    pub lifetime: i64,
}

/// Authenticate and issue a token pair
pub fn obtain_pair(
    state: &AuthState,
    request: &TokenObtainRequest,
) -> Result<TokenObtainResponse, AccountError> {
    let mut user = state
        .manager
        .authenticate(&request.email, &request.password)?
        .ok_or(AccountError::InvalidCredentials)?;

    let pair = state.jwt_handler.generate_pair(&user)?;

    if state.update_last_login {
        state.manager.record_login(&mut user)?;
    }

    info!("✅ Login successful: {} ({})", user.email, user.user_typ.as_str());

    Ok(TokenObtainResponse {
        refresh: pair.refresh,
        access: pair.access,
        lifetime: state.jwt_handler.access_lifetime().num_seconds(),
    })
}

/// Exchange a refresh token for a new access token
pub fn refresh_pair(
    state: &AuthState,
    request: &TokenRefreshRequest,
) -> Result<TokenRefreshResponse, AccountError> {
    let claims = state
        .jwt_handler
        .validate_token(&request.refresh, TokenType::Refresh)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AccountError::InvalidToken)?;
    let user = match state.manager.get_user(&user_id) {
        Ok(user) if user.is_active => user,
        Ok(_) | Err(AccountError::UserNotFound) => {
            warn!("❌ Refresh rejected for missing or inactive account {}", user_id);
            return Err(AccountError::InvalidToken);
        }
        Err(e) => return Err(e),
    };

    // Claims follow the stored account, not the refresh token.
    let access = state.jwt_handler.generate_token(&user, TokenType::Access)?;
    let refresh = if state.rotate_refresh_tokens {
        Some(state.jwt_handler.generate_token(&user, TokenType::Refresh)?)
    } else {
        None
    };

    Ok(TokenRefreshResponse {
        access,
        refresh,
        lifetime: state.jwt_handler.access_lifetime().num_seconds(),
    })
}
