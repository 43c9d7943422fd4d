//! Environment configuration

use crate::auth::jwt::{TokenLifetimes, DEFAULT_ACCESS_LIFETIME_SECS, DEFAULT_REFRESH_LIFETIME_SECS};
use crate::auth::user_code::DEFAULT_MAX_ATTEMPTS;
use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";
const DEFAULT_DB_FILENAME: &str = "mopito_accounts.db";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub db_path: String,
    pub jwt_secret: String,
    pub token_lifetimes: TokenLifetimes,
    pub rotate_refresh_tokens: bool,
    pub update_last_login: bool,
    pub bcrypt_cost: u32,
    pub user_code_max_attempts: u32,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = resolve_data_path(lookup("AUTH_DB_PATH"), DEFAULT_DB_FILENAME);

        let jwt_secret = match lookup("JWT_SECRET").filter(|v| !v.trim().is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("⚠️  JWT_SECRET not set, using development secret. CHANGE IN PRODUCTION!");
                DEV_JWT_SECRET.to_string()
            }
        };

        let access = parse_or(&lookup, "ACCESS_TOKEN_LIFETIME_SECS", DEFAULT_ACCESS_LIFETIME_SECS)?;
        let refresh = parse_or(&lookup, "REFRESH_TOKEN_LIFETIME_SECS", DEFAULT_REFRESH_LIFETIME_SECS)?;
        if access <= 0 || refresh <= 0 {
            bail!("Token lifetimes must be positive (access={access}, refresh={refresh})");
        }

        let bcrypt_cost = parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}");
        }

        Ok(Self {
            db_path,
            jwt_secret,
            token_lifetimes: TokenLifetimes {
                access: Duration::seconds(access),
                refresh: Duration::seconds(refresh),
            },
            rotate_refresh_tokens: flag(&lookup, "ROTATE_REFRESH_TOKENS"),
            update_last_login: flag(&lookup, "UPDATE_LAST_LOGIN"),
            bcrypt_cost,
            user_code_max_attempts: parse_or(&lookup, "USER_CODE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {key}: {raw}")),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(false)
}

fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return base.join(default_filename).to_string_lossy().to_string();
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() || p == Path::new(":memory:") {
        return p.to_string_lossy().to_string();
    }

    // Relative paths are anchored at the crate dir, not the caller's cwd.
    base.join(p).to_string_lossy().to_string()
}

/// Load `.env` from the cwd (and parents), then from the crate dir
pub fn load_env() {
    let _ = dotenv::dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AuthConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.db_path.ends_with(DEFAULT_DB_FILENAME));
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.token_lifetimes.access.num_seconds(), 300);
        assert_eq!(config.token_lifetimes.refresh.num_seconds(), 86_400);
        assert!(!config.rotate_refresh_tokens);
        assert!(!config.update_last_login);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.user_code_max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("AUTH_DB_PATH", "/var/lib/mopito/auth.db"),
            ("JWT_SECRET", "s3cr3t"),
            ("ACCESS_TOKEN_LIFETIME_SECS", "600"),
            ("REFRESH_TOKEN_LIFETIME_SECS", "7200"),
            ("ROTATE_REFRESH_TOKENS", "true"),
            ("UPDATE_LAST_LOGIN", "1"),
            ("BCRYPT_COST", "6"),
            ("USER_CODE_MAX_ATTEMPTS", "25"),
        ])
        .unwrap();

        assert_eq!(config.db_path, "/var/lib/mopito/auth.db");
        assert_eq!(config.jwt_secret, "s3cr3t");
        assert_eq!(config.token_lifetimes.access.num_seconds(), 600);
        assert_eq!(config.token_lifetimes.refresh.num_seconds(), 7200);
        assert!(config.rotate_refresh_tokens);
        assert!(config.update_last_login);
        assert_eq!(config.bcrypt_cost, 6);
        assert_eq!(config.user_code_max_attempts, 25);
    }

    #[test]
    fn test_relative_db_path_anchored_at_crate() {
        let config = config_from(&[("AUTH_DB_PATH", "data/auth.db")]).unwrap();
        assert!(config.db_path.starts_with(env!("CARGO_MANIFEST_DIR")));
        assert!(config.db_path.ends_with("auth.db"));

        let config = config_from(&[("AUTH_DB_PATH", ":memory:")]).unwrap();
        assert_eq!(config.db_path, ":memory:");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("ACCESS_TOKEN_LIFETIME_SECS", "soon")]).is_err());
        assert!(config_from(&[("ACCESS_TOKEN_LIFETIME_SECS", "0")]).is_err());
        assert!(config_from(&[("BCRYPT_COST", "2")]).is_err());
    }
}
