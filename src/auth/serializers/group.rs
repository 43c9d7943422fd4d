use super::{invalid_pk, required_text, PermissionView};
use crate::auth::error::{AccountError, ValidationErrors};
use crate::auth::models::Group;
use crate::auth::user_store::UserStore;
use serde::{Deserialize, Serialize};

/// Group with permission ids
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupView {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<i64>,
}

impl GroupView {
    pub fn load(store: &UserStore, group: &Group) -> Result<Self, AccountError> {
        let permissions = store
            .group_permissions(group.id)?
            .into_iter()
            .map(|p| p.id)
            .collect();

        Ok(Self {
            id: group.id,
            name: group.name.clone(),
            permissions,
        })
    }
}

/// Group with its permissions expanded
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupDetailView {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<PermissionView>,
}

impl GroupDetailView {
    pub fn load(store: &UserStore, group: &Group) -> Result<Self, AccountError> {
        let permissions = store.group_permissions(group.id)?;

        Ok(Self {
            id: group.id,
            name: group.name.clone(),
            permissions: PermissionView::many(&permissions),
        })
    }
}

/// Incoming group body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupPayload {
    pub name: Option<String>,
    pub permissions: Option<Vec<i64>>,
}

impl GroupPayload {
    /// `existing` is the id of the group being updated, if any
    fn validate(&self, store: &UserStore, existing: Option<i64>) -> Result<(), AccountError> {
        let mut errors = ValidationErrors::new();

        let name = if existing.is_some() && self.name.is_none() {
            None
        } else {
            required_text(&mut errors, "name", self.name.as_deref())
        };
        if let Some(name) = name {
            if store.group_name_taken(name, existing)? {
                errors.add("name", "group with this name already exists.");
            }
        }

        if let Some(ids) = &self.permissions {
            for id in store.missing_permission_ids(ids)? {
                errors.add("permissions", invalid_pk(id));
            }
        }

        errors.into_result()
    }

    pub fn create(&self, store: &UserStore) -> Result<GroupView, AccountError> {
        self.validate(store, None)?;

        let name = self.name.as_deref().unwrap_or_default().trim();
        let group = store.create_group(name)?;
        if let Some(ids) = &self.permissions {
            store.set_group_permissions(group.id, ids)?;
        }

        GroupView::load(store, &group)
    }

    /// Partial update: absent fields keep their stored value
    pub fn update(&self, store: &UserStore, group_id: i64) -> Result<GroupView, AccountError> {
        let mut group = store
            .get_group(group_id)?
            .ok_or(AccountError::GroupNotFound)?;
        self.validate(store, Some(group_id))?;

        if let Some(name) = &self.name {
            group.name = name.trim().to_string();
            store.rename_group(group.id, &group.name)?;
        }
        if let Some(ids) = &self.permissions {
            store.set_group_permissions(group.id, ids)?;
        }

        GroupView::load(store, &group)
    }
}
