use super::{required_text, validate_password};
use crate::auth::error::{AccountError, ValidationErrors, INVALID_OLD_PASSWORD};
use crate::auth::manager::UserManager;
use crate::auth::models::User;
use serde::Deserialize;
use tracing::{info, warn};

/// Password change by the account owner; the current password must be supplied
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelfPasswordChange {
    pub old_password: Option<String>,
    pub password: Option<String>,
}

impl SelfPasswordChange {
    /// Field-level checks against the authenticated requester
    pub fn validate(&self, manager: &UserManager, requester: &User) -> Result<(), AccountError> {
        let mut errors = ValidationErrors::new();

        if let Some(old) = required_text(&mut errors, "old_password", self.old_password.as_deref()) {
            if !manager.check_password(requester, old) {
                warn!("❌ Old password mismatch for {}", requester.email);
                errors.add("old_password", INVALID_OLD_PASSWORD);
            }
        }
        validate_password(&mut errors, "password", self.password.as_deref());

        errors.into_result()
    }

    /// Validate, then re-hash and persist the new password on the requester
    pub fn save(&self, manager: &UserManager, requester: &mut User) -> Result<(), AccountError> {
        self.validate(manager, requester)?;
        let password = self.password.as_deref().unwrap_or_default().trim();
        manager.set_password(requester, password)
    }
}

/// Administrative reset: no knowledge of the current password required
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordReset {
    pub password: Option<String>,
}

impl PasswordReset {
    pub fn save(&self, manager: &UserManager, target: &mut User) -> Result<(), AccountError> {
        let mut errors = ValidationErrors::new();
        let password = validate_password(&mut errors, "password", self.password.as_deref());
        let Some(password) = password else {
            return Err(AccountError::Validation(errors));
        };

        manager.set_password(target, password)?;
        info!("🔑 Password reset for {}", target.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::REQUIRED;
    use crate::auth::manager::ExtraFields;
    use crate::auth::password::PasswordHasher;
    use crate::auth::user_code::UserCodeGenerator;
    use crate::auth::user_store::UserStore;
    use serde_json::json;
    use std::sync::Arc;

    fn create_test_manager() -> UserManager {
        let store = Arc::new(UserStore::in_memory().unwrap());
        UserManager::new(store, PasswordHasher::new(4), UserCodeGenerator::default())
    }

    fn create_test_user(manager: &UserManager) -> User {
        manager
            .create_user("owner@clinic.example", Some("old-pass"), ExtraFields::default())
            .unwrap()
    }

    #[test]
    fn test_change_with_wrong_old_password_fails() {
        let manager = create_test_manager();
        let mut user = create_test_user(&manager);
        let old_hash = user.password_hash.clone();

        let change: SelfPasswordChange = serde_json::from_value(json!({
            "old_password": "not-it",
            "password": "new-pass",
        }))
        .unwrap();

        match change.save(&manager, &mut user) {
            Err(AccountError::Validation(errors)) => {
                assert_eq!(
                    errors.field("old_password"),
                    Some(&[INVALID_OLD_PASSWORD.to_string()][..])
                );
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert_eq!(user.password_hash, old_hash);
        let stored = manager.get_user(&user.id).unwrap();
        assert!(manager.check_password(&stored, "old-pass"));
    }

    #[test]
    fn test_change_with_matching_old_password_succeeds() {
        let manager = create_test_manager();
        let mut user = create_test_user(&manager);
        let old_hash = user.password_hash.clone();

        SelfPasswordChange {
            old_password: Some("old-pass".to_string()),
            password: Some("new-pass".to_string()),
        }
        .save(&manager, &mut user)
        .unwrap();

        assert_ne!(user.password_hash, old_hash);
        let stored = manager.get_user(&user.id).unwrap();
        assert!(manager.check_password(&stored, "new-pass"));
        assert!(!manager.check_password(&stored, "old-pass"));
    }

    #[test]
    fn test_change_rejects_old_password_sharing_long_prefix() {
        let manager = create_test_manager();
        let prefix = "a".repeat(80);
        let mut user = manager
            .create_user(
                "long@clinic.example",
                Some(&format!("{prefix}REAL")),
                ExtraFields::default(),
            )
            .unwrap();

        assert!(!manager.check_password(&user, &format!("{prefix}WRONG")));

        let change = SelfPasswordChange {
            old_password: Some(format!("{prefix}WRONG")),
            password: Some("replacement".to_string()),
        };
        assert!(matches!(
            change.save(&manager, &mut user),
            Err(AccountError::Validation(_))
        ));

        let stored = manager.get_user(&user.id).unwrap();
        assert!(manager.check_password(&stored, &format!("{prefix}REAL")));
    }

    #[test]
    fn test_reset_rejects_overlong_password() {
        let manager = create_test_manager();
        let mut user = create_test_user(&manager);

        let result = PasswordReset {
            password: Some("x".repeat(129)),
        }
        .save(&manager, &mut user);

        match result {
            Err(AccountError::Validation(errors)) => assert!(errors.field("password").is_some()),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_change_requires_both_fields() {
        let manager = create_test_manager();
        let user = create_test_user(&manager);

        match SelfPasswordChange::default().validate(&manager, &user) {
            Err(AccountError::Validation(errors)) => {
                assert_eq!(errors.field("old_password"), Some(&[REQUIRED.to_string()][..]));
                assert_eq!(errors.field("password"), Some(&[REQUIRED.to_string()][..]));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_skips_old_password() {
        let manager = create_test_manager();
        let mut user = create_test_user(&manager);

        PasswordReset {
            password: Some("reset-pass".to_string()),
        }
        .save(&manager, &mut user)
        .unwrap();

        let stored = manager.get_user(&user.id).unwrap();
        assert!(manager.check_password(&stored, "reset-pass"));

        assert!(matches!(
            PasswordReset::default().save(&manager, &mut user),
            Err(AccountError::Validation(_))
        ));
    }
}
