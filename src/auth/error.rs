//! Account Errors
//! Mission: One error type for every account operation, convertible into an
//! HTTP response by whichever router hosts it

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::error;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const DUPLICATE_EMAIL: &str = "A user with that email address already exists.";
pub const INVALID_OLD_PASSWORD: &str = "Old password is invalid.";

/// Field name → messages, serialized as `{"field": ["message", ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field error, ready to return.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), AccountError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AccountError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("The given email address must be set")]
    EmptyEmail,
    #[error("Superuser must have is_staff=True.")]
    SuperuserRequiresStaff,
    #[error("Superuser must have is_superuser=True.")]
    SuperuserRequiresSuperuser,
    #[error("no free user code after {attempts} attempts")]
    UserCodeExhausted { attempts: u32 },
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("No active account found with the given credentials")]
    InvalidCredentials,
    #[error("Token is invalid or expired")]
    InvalidToken,
    #[error("User not found")]
    UserNotFound,
    #[error("Group not found")]
    GroupNotFound,
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("token encoding failed: {0}")]
    TokenEncoding(#[source] jsonwebtoken::errors::Error),
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::EmptyEmail
            | AccountError::SuperuserRequiresStaff
            | AccountError::SuperuserRequiresSuperuser
            | AccountError::Validation(_) => StatusCode::BAD_REQUEST,
            AccountError::InvalidCredentials | AccountError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AccountError::UserNotFound | AccountError::GroupNotFound => StatusCode::NOT_FOUND,
            AccountError::UserCodeExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AccountError::Storage(_) | AccountError::Hashing(_) | AccountError::TokenEncoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AccountError::Validation(errors) => json!(errors),
            e if status.is_server_error() => {
                error!("Account operation failed: {e}");
                json!({ "detail": "Internal server error" })
            }
            e => json!({ "detail": e.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
