use super::{invalid_pk, validate_email, validate_password, validate_user_typ};
use super::{GroupDetailView, PermissionView};
use crate::auth::error::{AccountError, ValidationErrors};
use crate::auth::manager::{ExtraFields, UserManager};
use crate::auth::models::{User, UserType};
use crate::auth::user_store::UserStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Minimal user shape
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserView {
    pub id: Uuid,
    pub is_active: bool,
    pub email: String,
    pub user_typ: UserType,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            is_active: user.is_active,
            email: user.email.clone(),
            user_typ: user.user_typ,
        }
    }
}

/// Body accepted alongside [`UserView`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub user_typ: Option<String>,
}

impl UserPayload {
    pub fn create(&self, manager: &UserManager) -> Result<UserView, AccountError> {
        let mut errors = ValidationErrors::new();
        let email = validate_email(&mut errors, self.email.as_deref());
        let password = validate_password(&mut errors, "password", self.password.as_deref());
        let user_typ = self
            .user_typ
            .as_deref()
            .and_then(|raw| validate_user_typ(&mut errors, raw));

        let (Some(email), Some(password), true) = (email, password, errors.is_empty()) else {
            return Err(AccountError::Validation(errors));
        };

        let user = manager.create_user(
            &email,
            Some(password),
            ExtraFields {
                is_active: self.is_active,
                user_typ,
                ..Default::default()
            },
        )?;

        Ok(UserView::from(&user))
    }
}

/// User shape used by account administration: adds group and permission ids
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateUserView {
    pub id: Uuid,
    pub is_active: bool,
    pub email: String,
    pub user_typ: UserType,
    pub groups: Vec<i64>,
    pub user_permissions: Vec<i64>,
}

impl CreateUserView {
    pub fn load(store: &UserStore, user: &User) -> Result<Self, AccountError> {
        let groups = store.user_groups(&user.id)?.into_iter().map(|g| g.id).collect();
        let user_permissions = store
            .user_permissions(&user.id)?
            .into_iter()
            .map(|p| p.id)
            .collect();

        Ok(Self {
            id: user.id,
            is_active: user.is_active,
            email: user.email.clone(),
            user_typ: user.user_typ,
            groups,
            user_permissions,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserPayload {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub user_typ: Option<String>,
    pub groups: Option<Vec<i64>>,
    pub user_permissions: Option<Vec<i64>>,
}

/// Field values that survived validation
struct Validated<'a> {
    email: Option<String>,
    password: Option<&'a str>,
    user_typ: Option<UserType>,
}

impl CreateUserPayload {
    fn validate(&self, store: &UserStore, creating: bool) -> Result<Validated<'_>, AccountError> {
        let mut errors = ValidationErrors::new();

        let email = if creating || self.email.is_some() {
            validate_email(&mut errors, self.email.as_deref())
        } else {
            None
        };
        let password = if creating {
            validate_password(&mut errors, "password", self.password.as_deref())
        } else {
            None
        };
        let user_typ = self
            .user_typ
            .as_deref()
            .and_then(|raw| validate_user_typ(&mut errors, raw));

        if let Some(ids) = &self.groups {
            for id in store.missing_group_ids(ids)? {
                errors.add("groups", invalid_pk(id));
            }
        }
        if let Some(ids) = &self.user_permissions {
            for id in store.missing_permission_ids(ids)? {
                errors.add("user_permissions", invalid_pk(id));
            }
        }

        errors.into_result()?;
        Ok(Validated {
            email,
            password,
            user_typ,
        })
    }

    fn apply_relations(&self, store: &UserStore, user_id: &Uuid) -> Result<(), AccountError> {
        if let Some(ids) = &self.groups {
            store.set_user_groups(user_id, ids)?;
        }
        if let Some(ids) = &self.user_permissions {
            store.set_user_permissions(user_id, ids)?;
        }
        Ok(())
    }

    /// Create the user with a hashed password and the requested memberships
    pub fn create(&self, manager: &UserManager) -> Result<CreateUserView, AccountError> {
        let store = manager.store();
        let validated = self.validate(store, true)?;
        let email = validated.email.unwrap_or_default();

        let user = manager.create_user(
            &email,
            validated.password,
            ExtraFields {
                is_active: self.is_active,
                user_typ: validated.user_typ,
                groups: self.groups.clone().unwrap_or_default(),
                user_permissions: self.user_permissions.clone().unwrap_or_default(),
                ..Default::default()
            },
        )?;

        CreateUserView::load(store, &user)
    }

    /// Update supplied fields; the password is never changed here
    pub fn update(&self, manager: &UserManager, user_id: &Uuid) -> Result<CreateUserView, AccountError> {
        let store = manager.store();
        let mut user = manager.get_user(user_id)?;
        let validated = self.validate(store, false)?;

        if self.password.is_some() {
            debug!("Ignoring password in profile update for {}", user.email);
        }

        if let Some(email) = validated.email {
            user.email = email;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(user_typ) = validated.user_typ {
            user.user_typ = user_typ;
        }

        manager.update_profile(&mut user)?;
        self.apply_relations(store, &user.id)?;

        CreateUserView::load(store, &user)
    }
}

/// Full user shape: nested groups, direct permissions and the effective permission set
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserDetailView {
    pub id: Uuid,
    pub is_active: bool,
    pub email: String,
    pub user_typ: UserType,
    pub user_permissions: Vec<PermissionView>,
    pub groups: Vec<GroupDetailView>,
    pub permissions: BTreeSet<String>,
}

impl UserDetailView {
    pub fn load(store: &UserStore, user: &User) -> Result<Self, AccountError> {
        let user_permissions = PermissionView::many(&store.user_permissions(&user.id)?);
        let groups = store
            .user_groups(&user.id)?
            .iter()
            .map(|group| GroupDetailView::load(store, group))
            .collect::<Result<Vec<_>, _>>()?;
        let permissions = effective_permissions(&user_permissions, &groups);

        Ok(Self {
            id: user.id,
            is_active: user.is_active,
            email: user.email.clone(),
            user_typ: user.user_typ,
            user_permissions,
            groups,
            permissions,
        })
    }
}

/// Union of direct and group-inherited permission codes, without duplicates
pub fn effective_permissions(
    direct: &[PermissionView],
    groups: &[GroupDetailView],
) -> BTreeSet<String> {
    direct
        .iter()
        .chain(groups.iter().flat_map(|group| group.permissions.iter()))
        .map(|permission| permission.code.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::{BLANK, DUPLICATE_EMAIL, INVALID_EMAIL, REQUIRED};
    use crate::auth::password::PasswordHasher;
    use crate::auth::user_code::UserCodeGenerator;
    use serde_json::json;
    use std::sync::Arc;

    fn create_test_manager() -> UserManager {
        let store = Arc::new(UserStore::in_memory().unwrap());
        UserManager::new(store, PasswordHasher::new(4), UserCodeGenerator::default())
    }

    fn permission_id(store: &UserStore, code: &str) -> i64 {
        store.find_permission_by_code(code).unwrap().unwrap().id
    }

    fn validation_errors(result: Result<impl std::fmt::Debug, AccountError>) -> ValidationErrors {
        match result {
            Err(AccountError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_create_hashes_password() {
        let manager = create_test_manager();
        let payload: UserPayload = serde_json::from_value(json!({
            "email": "patient@Clinic.example",
            "password": "pass-1234",
            "user_typ": "PATIENT",
        }))
        .unwrap();

        let view = payload.create(&manager).unwrap();
        assert_eq!(view.email, "patient@clinic.example");
        assert_eq!(view.user_typ, UserType::Patient);
        assert!(view.is_active);

        let value = serde_json::to_value(&view).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["user_typ"], "PATIENT");

        let stored = manager.get_user(&view.id).unwrap();
        assert!(manager.check_password(&stored, "pass-1234"));
    }

    #[test]
    fn test_minimal_create_validation() {
        let manager = create_test_manager();

        let errors = validation_errors(UserPayload::default().create(&manager));
        assert_eq!(errors.field("email"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(errors.field("password"), Some(&[REQUIRED.to_string()][..]));

        let errors = validation_errors(
            UserPayload {
                email: Some("not-an-email".to_string()),
                password: Some("".to_string()),
                is_active: None,
                user_typ: Some("DOCTOR".to_string()),
            }
            .create(&manager),
        );
        assert_eq!(errors.field("email"), Some(&[INVALID_EMAIL.to_string()][..]));
        assert_eq!(errors.field("password"), Some(&[BLANK.to_string()][..]));
        assert!(errors.field("user_typ").is_some());
    }

    #[test]
    fn test_minimal_create_rejects_overlong_email() {
        let manager = create_test_manager();

        let errors = validation_errors(
            UserPayload {
                email: Some(format!("{}@x.example", "a".repeat(300))),
                password: Some("pass".to_string()),
                ..Default::default()
            }
            .create(&manager),
        );
        assert_eq!(
            errors.field("email"),
            Some(&["Ensure this field has no more than 254 characters.".to_string()][..])
        );
        assert!(manager.store().list_users().unwrap().is_empty());
    }

    #[test]
    fn test_create_with_groups_and_permissions() {
        let manager = create_test_manager();
        let store = manager.store();
        let nurses = store.create_group("nurses").unwrap();
        let view_user = permission_id(store, "users.view_user");

        let payload: CreateUserPayload = serde_json::from_value(json!({
            "email": "nurse@clinic.example",
            "password": "pass",
            "user_typ": "STAFF",
            "groups": [nurses.id],
            "user_permissions": [view_user],
        }))
        .unwrap();

        let view = payload.create(&manager).unwrap();
        assert_eq!(view.groups, vec![nurses.id]);
        assert_eq!(view.user_permissions, vec![view_user]);
        assert_eq!(view.user_typ, UserType::Staff);

        let stored = manager.get_user(&view.id).unwrap();
        assert!(manager.check_password(&stored, "pass"));
        assert_ne!(stored.password_hash, "pass");
    }

    #[test]
    fn test_create_rejects_unknown_relations_and_duplicates() {
        let manager = create_test_manager();
        let payload = CreateUserPayload {
            email: Some("x@clinic.example".to_string()),
            password: Some("pass".to_string()),
            groups: Some(vec![31]),
            user_permissions: Some(vec![9999]),
            ..Default::default()
        };
        let errors = validation_errors(payload.create(&manager));
        assert_eq!(
            errors.field("groups"),
            Some(&["Invalid pk \"31\" - object does not exist.".to_string()][..])
        );
        assert!(errors.field("user_permissions").is_some());
        assert!(manager.store().list_users().unwrap().is_empty());

        let payload = CreateUserPayload {
            email: Some("x@clinic.example".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        };
        payload.create(&manager).unwrap();
        let errors = validation_errors(payload.create(&manager));
        assert_eq!(errors.field("email"), Some(&[DUPLICATE_EMAIL.to_string()][..]));
    }

    #[test]
    fn test_update_ignores_password() {
        let manager = create_test_manager();
        let created = CreateUserPayload {
            email: Some("edit@clinic.example".to_string()),
            password: Some("original".to_string()),
            ..Default::default()
        }
        .create(&manager)
        .unwrap();
        let group = manager.store().create_group("patients").unwrap();

        let updated = CreateUserPayload {
            email: Some("Edited@Clinic.example".to_string()),
            password: Some("hijacked".to_string()),
            is_active: Some(false),
            user_typ: Some("PATIENT".to_string()),
            groups: Some(vec![group.id]),
            user_permissions: None,
        }
        .update(&manager, &created.id)
        .unwrap();

        assert_eq!(updated.email, "Edited@clinic.example");
        assert!(!updated.is_active);
        assert_eq!(updated.user_typ, UserType::Patient);
        assert_eq!(updated.groups, vec![group.id]);

        let stored = manager.get_user(&created.id).unwrap();
        assert!(manager.check_password(&stored, "original"));
        assert!(!manager.check_password(&stored, "hijacked"));
    }

    #[test]
    fn test_update_unknown_user() {
        let manager = create_test_manager();
        assert!(matches!(
            CreateUserPayload::default().update(&manager, &Uuid::new_v4()),
            Err(AccountError::UserNotFound)
        ));
    }

    #[test]
    fn test_detail_permissions_are_union_of_direct_and_groups() {
        let manager = create_test_manager();
        let store = manager.store();
        let view_user = permission_id(store, "users.view_user");
        let add_user = permission_id(store, "users.add_user");
        let view_group = permission_id(store, "auth.view_group");

        let nurses = store.create_group("nurses").unwrap();
        store.set_group_permissions(nurses.id, &[view_user, add_user]).unwrap();
        let auditors = store.create_group("auditors").unwrap();
        store.set_group_permissions(auditors.id, &[view_user, view_group]).unwrap();

        let user = manager
            .create_user("detail@clinic.example", Some("pass"), ExtraFields::default())
            .unwrap();
        store.set_user_permissions(&user.id, &[view_user]).unwrap();
        store.set_user_groups(&user.id, &[nurses.id, auditors.id]).unwrap();

        let detail = UserDetailView::load(store, &user).unwrap();
        let expected: BTreeSet<String> = ["users.view_user", "users.add_user", "auth.view_group"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(detail.permissions, expected);
        assert_eq!(detail.groups.len(), 2);
        assert_eq!(detail.user_permissions.len(), 1);

        let value = serde_json::to_value(&detail).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["permissions"].as_array().unwrap().len(), 3);
        assert_eq!(value["groups"][0]["name"], "nurses");
    }

    #[test]
    fn test_detail_without_any_permissions() {
        let manager = create_test_manager();
        let user = manager
            .create_user("bare@clinic.example", None, ExtraFields::default())
            .unwrap();

        let detail = UserDetailView::load(manager.store(), &user).unwrap();
        assert!(detail.permissions.is_empty());
        assert!(detail.groups.is_empty());
    }
}
