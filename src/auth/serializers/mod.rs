//! Serialization layer
//!
//! Maps users, groups and permissions to their JSON transport shapes and
//! validates incoming payloads field by field before anything is written.
//! `password` is accepted on input and never rendered on output.

pub mod group;
pub mod password;
pub mod permission;
pub mod user;

pub use group::{GroupDetailView, GroupPayload, GroupView};
pub use password::{PasswordReset, SelfPasswordChange};
pub use permission::PermissionView;
pub use user::{
    effective_permissions, CreateUserPayload, CreateUserView, UserDetailView, UserPayload,
    UserView,
};

use crate::auth::error::{ValidationErrors, BLANK, INVALID_EMAIL, REQUIRED};
use crate::auth::models::UserType;

pub const EMAIL_MAX_LENGTH: usize = 254;
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Checks a string field that must be present and non-blank; returns it trimmed
pub(crate) fn required_text<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    match value.map(str::trim) {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some("") => {
            errors.add(field, BLANK);
            None
        }
        Some(v) => Some(v),
    }
}

/// Shape check only: a local part, an `@`, and a dotted domain.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

/// Rejects values longer than `max` characters
fn check_max_length(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) -> bool {
    if value.chars().count() > max {
        errors.add(
            field,
            format!("Ensure this field has no more than {max} characters."),
        );
        return false;
    }
    true
}

pub(crate) fn validate_email(errors: &mut ValidationErrors, value: Option<&str>) -> Option<String> {
    let email = required_text(errors, "email", value)?;
    if !check_max_length(errors, "email", email, EMAIL_MAX_LENGTH) {
        return None;
    }
    if !is_valid_email(email) {
        errors.add("email", INVALID_EMAIL);
        return None;
    }
    Some(email.to_string())
}

/// Required password field, capped at the stored column's length
pub(crate) fn validate_password<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    let password = required_text(errors, field, value)?;
    check_max_length(errors, field, password, PASSWORD_MAX_LENGTH).then_some(password)
}

pub(crate) fn validate_user_typ(errors: &mut ValidationErrors, value: &str) -> Option<UserType> {
    let parsed = UserType::parse(value);
    if parsed.is_none() {
        errors.add("user_typ", format!("\"{value}\" is not a valid choice."));
    }
    parsed
}

pub(crate) fn invalid_pk(id: i64) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("jane@clinic.example"));
        assert!(is_valid_email("jane+tag@sub.clinic-1.example"));
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("@clinic.example"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane@clinic..example"));
        assert!(!is_valid_email("ja ne@clinic.example"));
        assert!(!is_valid_email("jane@-clinic.example"));
    }

    #[test]
    fn test_required_text() {
        let mut errors = ValidationErrors::new();
        assert_eq!(required_text(&mut errors, "name", Some("  nurses ")), Some("nurses"));
        assert!(errors.is_empty());

        assert_eq!(required_text(&mut errors, "name", None), None);
        assert_eq!(required_text(&mut errors, "other", Some("   ")), None);
        assert_eq!(errors.field("name"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(errors.field("other"), Some(&[BLANK.to_string()][..]));
    }

    #[test]
    fn test_email_length_cap() {
        let domain = "@clinic.example";
        let at_limit = format!("{}{domain}", "a".repeat(EMAIL_MAX_LENGTH - domain.len()));
        let over_limit = format!("a{at_limit}");
        assert_eq!(at_limit.len(), 254);

        let mut errors = ValidationErrors::new();
        assert_eq!(
            validate_email(&mut errors, Some(&at_limit)).as_deref(),
            Some(at_limit.as_str())
        );
        assert!(errors.is_empty());

        assert_eq!(validate_email(&mut errors, Some(&over_limit)), None);
        assert_eq!(
            errors.field("email"),
            Some(&["Ensure this field has no more than 254 characters.".to_string()][..])
        );
    }

    #[test]
    fn test_password_length_cap() {
        let at_limit = "p".repeat(PASSWORD_MAX_LENGTH);
        let over_limit = "p".repeat(PASSWORD_MAX_LENGTH + 1);

        let mut errors = ValidationErrors::new();
        assert_eq!(
            validate_password(&mut errors, "password", Some(&at_limit)),
            Some(at_limit.as_str())
        );
        assert!(errors.is_empty());

        assert_eq!(validate_password(&mut errors, "password", Some(&over_limit)), None);
        assert_eq!(
            errors.field("password"),
            Some(&["Ensure this field has no more than 128 characters.".to_string()][..])
        );
    }

    #[test]
    fn test_user_typ_choice() {
        let mut errors = ValidationErrors::new();
        assert_eq!(validate_user_typ(&mut errors, "STAFF"), Some(UserType::Staff));
        assert_eq!(validate_user_typ(&mut errors, "NURSE"), None);
        assert_eq!(
            errors.field("user_typ"),
            Some(&["\"NURSE\" is not a valid choice.".to_string()][..])
        );
    }
}
