//! Accounts: sign-up, sign-in, profile and the requests that start a
//! confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::SessionStore;
use crate::auth::password::{hash_secret, verify_secret};
use crate::confirmation::{ConfirmationAction, ConfirmationService, UserUpdate};
use crate::error::{ServiceError, ServiceResult};
use crate::files::{FileService, Upload};
use crate::storage::{DatabaseError, ServerDatabase, User, UserPatch};
use crate::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    fn validate(&self) -> ServiceResult<()> {
        validate::email(&self.email)?;
        validate::password(&self.password)
    }
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub registered_at: DateTime<Utc>,
    pub avatar_url: String,
}

#[derive(Clone)]
pub struct UserService {
    db: ServerDatabase,
    sessions: SessionStore,
    files: FileService,
    confirmations: ConfirmationService,
}

impl UserService {
    pub const fn new(
        db: ServerDatabase,
        sessions: SessionStore,
        files: FileService,
        confirmations: ConfirmationService,
    ) -> Self {
        Self {
            db,
            sessions,
            files,
            confirmations,
        }
    }

    async fn user(&self, user_id: i64) -> ServiceResult<User> {
        self.db
            .get_user(user_id)
            .await
            .map_err(|e| ServiceError::from_lookup(e, ServiceError::UserNotFound))
    }

    async fn verified_user(&self, user_id: i64) -> ServiceResult<User> {
        let user = self.user(user_id).await?;
        if user.email_verified {
            Ok(user)
        } else {
            Err(ServiceError::EmailNotVerified)
        }
    }

    /// Create an account and sign it in. Returns the new session id.
    #[instrument(skip_all)]
    pub async fn sign_up(&self, credentials: &Credentials) -> ServiceResult<String> {
        credentials.validate()?;
        let hash = hash_secret(&credentials.password).map_err(ServiceError::internal)?;
        let username = uuid::Uuid::new_v4().simple().to_string();

        let user = match self
            .db
            .create_user(&username, &credentials.email, &hash, self.files.default_avatar())
            .await
        {
            Ok(user) => user,
            Err(DatabaseError::Conflict(_)) => return Err(ServiceError::UserAlreadyExists),
            Err(e) => return Err(e.into()),
        };
        info!(user_id = user.id, "User signed up");

        Ok(self.sessions.create(user.id).await)
    }

    /// Check credentials and start a session. Returns the session id.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, credentials: &Credentials) -> ServiceResult<String> {
        credentials.validate()?;
        let user = self
            .db
            .get_user_by_email(&credentials.email)
            .await
            .map_err(|e| ServiceError::from_lookup(e, ServiceError::UserNotFound))?;

        if !verify_secret(&credentials.password, &user.password_hash)
            .map_err(ServiceError::internal)?
        {
            return Err(ServiceError::UserWrongPassword);
        }
        Ok(self.sessions.create(user.id).await)
    }

    pub async fn logout(&self, session_id: &str) {
        self.sessions.destroy(session_id).await;
    }

    pub async fn info(&self, user_id: i64) -> ServiceResult<UserInfo> {
        let user = self.user(user_id).await?;
        Ok(UserInfo {
            avatar_url: self.files.avatar_url(&user.avatar),
            registered_at: DateTime::from_timestamp(user.registered_at, 0).unwrap_or_default(),
            id: user.id,
            username: user.username,
            email: user.email,
            email_verified: user.email_verified,
        })
    }

    pub async fn request_email_verification(&self, user_id: i64) -> ServiceResult<()> {
        let user = self.user(user_id).await?;
        self.confirmations
            .request(&user, &ConfirmationAction::VerifyEmail)
            .await
    }

    /// Park a profile edit behind a confirmation code. A new password is
    /// hashed before it is stored.
    pub async fn request_edit(&self, user_id: i64, update: UserUpdate) -> ServiceResult<()> {
        update.validate()?;
        let user = self.verified_user(user_id).await?;
        let pending = update.into_pending()?;
        self.confirmations
            .request(&user, &ConfirmationAction::EditUser(pending))
            .await
    }

    pub async fn request_deletion(&self, user_id: i64) -> ServiceResult<()> {
        let user = self.verified_user(user_id).await?;
        self.confirmations
            .request(&user, &ConfirmationAction::DeleteUser)
            .await
    }

    /// Store a new avatar image and point the profile at it.
    #[instrument(skip(self, upload))]
    pub async fn change_avatar(&self, user_id: i64, upload: Upload) -> ServiceResult<String> {
        self.user(user_id).await?;
        let record = self.files.upload_avatar(user_id, upload).await?;
        self.db
            .patch_user(user_id, UserPatch::Avatar(record.key.clone()))
            .await?;
        info!(key = %record.key, "Avatar changed");
        Ok(self.files.avatar_url(&record.key))
    }
}
