//! Account Module
//! Mission: User lifecycle, permissions, password management and JWT issuance

pub mod error;
pub mod jwt;
pub mod mailer;
pub mod manager;
pub mod models;
pub mod password;
pub mod serializers;
pub mod tokens;
pub mod user_code;
pub mod user_store;

pub use error::{AccountError, ValidationErrors};
pub use jwt::{JwtHandler, TokenLifetimes};
pub use manager::{ExtraFields, UserManager};
pub use user_store::UserStore;

use crate::config::AuthConfig;
use anyhow::Result;
use password::PasswordHasher;
use std::sync::Arc;
use tracing::info;
use user_code::UserCodeGenerator;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub manager: Arc<UserManager>,
    pub jwt_handler: Arc<JwtHandler>,
    pub rotate_refresh_tokens: bool,
    pub update_last_login: bool,
}

impl AuthState {
    pub fn new(manager: Arc<UserManager>, jwt_handler: Arc<JwtHandler>) -> Self {
        Self {
            manager,
            jwt_handler,
            rotate_refresh_tokens: false,
            update_last_login: false,
        }
    }

    /// Open the store and wire every component from configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let user_store = Arc::new(UserStore::new(&config.db_path)?);
        let manager = UserManager::new(
            user_store,
            PasswordHasher::new(config.bcrypt_cost),
            UserCodeGenerator::new(config.user_code_max_attempts),
        );
        let jwt_handler = JwtHandler::with_lifetimes(config.jwt_secret.clone(), config.token_lifetimes);

        info!("🔐 Authentication initialized at: {}", config.db_path);

        Ok(Self {
            manager: Arc::new(manager),
            jwt_handler: Arc::new(jwt_handler),
            rotate_refresh_tokens: config.rotate_refresh_tokens,
            update_last_login: config.update_last_login,
        })
    }

    pub fn store(&self) -> &UserStore {
        self.manager.store()
    }
}
