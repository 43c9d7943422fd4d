//! User Account Manager
//! Mission: The only place user records are constructed, so every stored user
//! has a normalized email, a hashed password and consistent flags

use crate::auth::error::{AccountError, ValidationErrors, DUPLICATE_EMAIL};
use crate::auth::models::{User, UserType};
use crate::auth::password::PasswordHasher;
use crate::auth::user_code::UserCodeGenerator;
use crate::auth::user_store::UserStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Optional overrides for a new user; `None` means "use the default"
#[derive(Debug, Clone, Default)]
pub struct ExtraFields {
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub user_typ: Option<UserType>,
    pub user_code: Option<String>,
    pub date_joined: Option<DateTime<Utc>>,
    /// Group ids linked in the same transaction as the insert
    pub groups: Vec<i64>,
    pub user_permissions: Vec<i64>,
}

/// Trim and lowercase the domain part. The local part is left alone.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub struct UserManager {
    store: Arc<UserStore>,
    hasher: PasswordHasher,
    codes: UserCodeGenerator,
}

impl UserManager {
    pub fn new(store: Arc<UserStore>, hasher: PasswordHasher, codes: UserCodeGenerator) -> Self {
        Self {
            store,
            hasher,
            codes,
        }
    }

    pub fn store(&self) -> &UserStore {
        &self.store
    }

    /// Create and save a regular user
    pub fn create_user(
        &self,
        email: &str,
        password: Option<&str>,
        mut fields: ExtraFields,
    ) -> Result<User, AccountError> {
        fields.is_staff = fields.is_staff.or(Some(false));
        fields.is_superuser = fields.is_superuser.or(Some(false));
        self.create(email, password, fields)
    }

    /// Create and save a user with staff and superuser status
    pub fn create_superuser(
        &self,
        email: &str,
        password: Option<&str>,
        mut fields: ExtraFields,
    ) -> Result<User, AccountError> {
        if !*fields.is_staff.get_or_insert(true) {
            return Err(AccountError::SuperuserRequiresStaff);
        }
        if !*fields.is_superuser.get_or_insert(true) {
            return Err(AccountError::SuperuserRequiresSuperuser);
        }
        self.create(email, password, fields)
    }

    fn create(
        &self,
        email: &str,
        password: Option<&str>,
        fields: ExtraFields,
    ) -> Result<User, AccountError> {
        if email.trim().is_empty() {
            return Err(AccountError::EmptyEmail);
        }
        let email = normalize_email(email);
        self.ensure_email_available(&email, None)?;

        let user_code = match fields.user_code {
            Some(code) => code,
            None => self.generate_user_code()?,
        };

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: self.hasher.hash_optional(password)?,
            is_active: fields.is_active.unwrap_or(true),
            is_staff: fields.is_staff.unwrap_or(false),
            is_superuser: fields.is_superuser.unwrap_or(false),
            user_typ: fields.user_typ.unwrap_or_default(),
            user_code: Some(user_code),
            date_joined: fields.date_joined.unwrap_or_else(Utc::now),
            last_login: None,
        };

        self.store
            .insert_user_with_relations(&user, &fields.groups, &fields.user_permissions)?;

        info!(
            "✅ Created user: {} ({}{})",
            user.email,
            user.user_typ.as_str(),
            if user.is_superuser { ", superuser" } else { "" }
        );

        Ok(user)
    }

    /// 4-digit code not held by any active user
    pub fn generate_user_code(&self) -> Result<String, AccountError> {
        self.codes
            .generate(|code| self.store.active_user_code_exists(code))
    }

    fn ensure_email_available(&self, email: &str, owner: Option<&Uuid>) -> Result<(), AccountError> {
        if self.store.email_taken(email, owner)? {
            return Err(AccountError::Validation(ValidationErrors::single(
                "email",
                DUPLICATE_EMAIL,
            )));
        }
        Ok(())
    }

    pub fn get_user(&self, user_id: &Uuid) -> Result<User, AccountError> {
        self.store
            .get_user(user_id)?
            .ok_or(AccountError::UserNotFound)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User, AccountError> {
        self.store
            .get_user_by_email(&normalize_email(email))?
            .ok_or(AccountError::UserNotFound)
    }

    /// Hash `raw` and persist it as the user's password
    pub fn set_password(&self, user: &mut User, raw: &str) -> Result<(), AccountError> {
        let password_hash = self.hasher.hash(raw)?;
        self.store.set_password_hash(&user.id, &password_hash)?;
        user.password_hash = password_hash;

        info!("🔑 Password changed for {}", user.email);
        Ok(())
    }

    pub fn check_password(&self, user: &User, raw: &str) -> bool {
        self.hasher.verify(raw, &user.password_hash)
    }

    /// The user for these credentials, if it exists, is active and the password matches
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, AccountError> {
        let Some(user) = self.store.get_user_by_email(&normalize_email(email))? else {
            warn!("❌ Login attempt for unknown account: {}", email);
            return Ok(None);
        };

        if !self.check_password(&user, password) {
            warn!("❌ Failed login attempt: {}", user.email);
            return Ok(None);
        }
        if !user.is_active {
            warn!("❌ Login attempt for inactive account: {}", user.email);
            return Ok(None);
        }

        Ok(Some(user))
    }

    /// Persist profile fields after normalizing the email and checking it is still unique
    pub fn update_profile(&self, user: &mut User) -> Result<(), AccountError> {
        if user.email.trim().is_empty() {
            return Err(AccountError::EmptyEmail);
        }
        let email = normalize_email(&user.email);
        self.ensure_email_available(&email, Some(&user.id))?;
        user.email = email;
        self.store.update_user(user)?;
        Ok(())
    }

    pub fn record_login(&self, user: &mut User) -> Result<(), AccountError> {
        user.last_login = Some(Utc::now());
        self.store.update_user(user)?;
        Ok(())
    }

    /// Soft delete: the account stays but can no longer authenticate
    pub fn deactivate(&self, user: &mut User) -> Result<(), AccountError> {
        user.is_active = false;
        self.store.update_user(user)?;

        info!("🚫 Deactivated user: {}", user.email);
        Ok(())
    }
}
