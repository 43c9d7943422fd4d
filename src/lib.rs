//! Mopito Accounts Library
//!
//! User account management: users, groups and permissions persisted in
//! SQLite, password change/reset, and JWT pairs that report their lifetime.

pub mod auth;
pub mod config;

pub use auth::{AccountError, AuthState};
pub use config::AuthConfig;
