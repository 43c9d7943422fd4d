use crate::auth::models::Permission;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionView {
    pub id: i64,
    pub name: String,
    pub code: String,
}

impl From<&Permission> for PermissionView {
    fn from(permission: &Permission) -> Self {
        Self {
            id: permission.id,
            name: permission.name.clone(),
            code: permission.code(),
        }
    }
}

impl PermissionView {
    pub fn many(permissions: &[Permission]) -> Vec<Self> {
        permissions.iter().map(Self::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permission_view_shape() {
        let permission = Permission {
            id: 3,
            name: "Can delete user".to_string(),
            app_label: "users".to_string(),
            model: "user".to_string(),
            codename: "delete_user".to_string(),
        };

        let value = serde_json::to_value(PermissionView::from(&permission)).unwrap();
        assert_eq!(
            value,
            json!({ "id": 3, "name": "Can delete user", "code": "users.delete_user" })
        );
    }
}
