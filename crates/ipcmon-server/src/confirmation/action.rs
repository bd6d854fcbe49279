//! Actions guarded by a confirmation code.

use serde::{Deserialize, Serialize};

use crate::auth::password::hash_secret;
use crate::error::{ServiceError, ServiceResult};
use crate::validate;

pub const TAG_VERIFY_EMAIL: &str = "email_verification";
pub const TAG_DELETE_USER: &str = "user_deletion";
pub const TAG_EDIT_USER: &str = "edit_user";

/// A profile edit as requested. Absent fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserUpdate {
    pub const fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.avatar.is_none()
            && self.password.is_none()
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.is_empty() {
            return Err(ServiceError::Validation("nothing to update".into()));
        }
        if let Some(email) = &self.email {
            validate::email(email)?;
        }
        if let Some(username) = &self.username {
            validate::username(username)?;
        }
        if let Some(avatar) = &self.avatar {
            validate::avatar(avatar)?;
        }
        if let Some(password) = &self.password {
            validate::new_password(password)?;
        }
        Ok(())
    }

    /// Validate the edit and hash its password so it can wait in the cache
    /// for confirmation.
    pub fn into_pending(self) -> ServiceResult<PendingEdit> {
        self.validate()?;
        let password_hash = self
            .password
            .as_deref()
            .map(hash_secret)
            .transpose()
            .map_err(ServiceError::internal)?;
        Ok(PendingEdit {
            email: self.email,
            username: self.username,
            avatar: self.avatar,
            password_hash,
        })
    }
}

/// A validated edit waiting for its confirmation code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationAction {
    VerifyEmail,
    DeleteUser,
    EditUser(PendingEdit),
}

impl ConfirmationAction {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::VerifyEmail => TAG_VERIFY_EMAIL,
            Self::DeleteUser => TAG_DELETE_USER,
            Self::EditUser(_) => TAG_EDIT_USER,
        }
    }

    /// Serialized data the action needs when it is finally applied.
    pub(super) fn payload(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::EditUser(update) => serde_json::to_string(update),
            Self::VerifyEmail | Self::DeleteUser => Ok(String::new()),
        }
    }

    /// Rebuild an action from a stored tag and payload. Unknown tags and
    /// unreadable payloads yield `None`.
    pub(super) fn from_stored(tag: Option<&str>, payload: Option<&str>) -> Option<Self> {
        match tag? {
            TAG_VERIFY_EMAIL => Some(Self::VerifyEmail),
            TAG_DELETE_USER => Some(Self::DeleteUser),
            TAG_EDIT_USER => serde_json::from_str(payload?).ok().map(Self::EditUser),
            _ => None,
        }
    }
}
