//! Account Models
//! Mission: Define user, group, permission and token claim structures

use crate::auth::mailer::Mailer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub user_typ: UserType,
    pub user_code: Option<String>,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn get_full_name(&self) -> &str {
        &self.email
    }

    pub fn get_short_name(&self) -> &str {
        &self.email
    }

    /// Send a message to this user through the configured mail hook.
    pub fn email_user(
        &self,
        mailer: &dyn Mailer,
        subject: &str,
        message: &str,
        from_email: Option<&str>,
    ) -> anyhow::Result<()> {
        mailer.send_mail(subject, message, from_email, std::slice::from_ref(&self.email))
    }

    /// Permission check over an already computed permission set.
    ///
    /// Inactive users hold nothing; active superusers hold everything.
    pub fn has_perm(&self, code: &str, effective: &BTreeSet<String>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_superuser || effective.contains(code)
    }
}

/// Account classification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserType {
    #[serde(rename = "PATIENT")]
    Patient,
    #[serde(rename = "STAFF")]
    Staff,
    #[default]
    #[serde(rename = "ADMIN")]
    Admin,
}

impl UserType {
    pub const ALL: [UserType; 3] = [UserType::Patient, UserType::Staff, UserType::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Patient => "PATIENT",
            UserType::Staff => "STAFF",
            UserType::Admin => "ADMIN",
        }
    }

    /// Exact match on the stored choice value.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Named collection of permissions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

/// Permission keyed by content type (`app_label`, `model`) and codename
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub app_label: String,
    pub model: String,
    pub codename: String,
}

impl Permission {
    /// Dotted form used in permission checks, e.g. `users.change_user`.
    pub fn code(&self) -> String {
        format!("{}.{}", self.app_label, self.codename)
    }
}

/// Distinguishes the two halves of a token pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    pub sub: String, // subject (user_id)
    pub email: String,
    pub user_typ: UserType,
    pub iat: usize,
    pub exp: usize, // expiration timestamp
    pub jti: String,
}
