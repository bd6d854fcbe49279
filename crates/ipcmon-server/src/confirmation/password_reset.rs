//! Password reset with signed, single-use tokens.
//!
//! The token is a JWT, but its `jti` is also mirrored in the cache under
//! `password_reset:user:{id}`. Only the most recently issued token for a
//! user is accepted, and only once.

use std::time::Duration;

use ipcmon_core::Cache;
use ipcmon_core::config::PasswordResetConfig;
use tracing::{debug, info, instrument};

use crate::auth::JwtManager;
use crate::auth::password::hash_secret;
use crate::error::{ServiceError, ServiceResult};
use crate::mail::{EmailKind, EmailMessage, EmailQueue};
use crate::storage::{ServerDatabase, UserPatch};
use crate::validate;

const NAMESPACE: &str = "password_reset";

fn record_key(user_id: i64) -> String {
    format!("user:{user_id}")
}

#[derive(Clone)]
pub struct PasswordResetService {
    db: ServerDatabase,
    cache: Cache,
    mail: EmailQueue,
    jwt: JwtManager,
    ttl: Duration,
}

impl PasswordResetService {
    pub fn new(
        db: ServerDatabase,
        cache: Cache,
        mail: EmailQueue,
        settings: &PasswordResetConfig,
    ) -> Self {
        let ttl = settings.ttl();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            db,
            cache,
            mail,
            jwt: JwtManager::new(settings.jwt_secret.as_bytes(), ttl_secs),
            ttl,
        }
    }

    /// Mail a reset link to a verified address.
    #[instrument(skip(self, email))]
    pub async fn forgot_password(&self, email: &str) -> ServiceResult<()> {
        let user = self
            .db
            .get_user_by_email(email)
            .await
            .map_err(|e| ServiceError::from_lookup(e, ServiceError::UserNotFound))?;
        if !user.email_verified {
            return Err(ServiceError::EmailNotVerified);
        }

        let issued = self
            .jwt
            .issue_reset_token(user.id)
            .map_err(ServiceError::internal)?;
        self.cache
            .set(NAMESPACE, &record_key(user.id), issued.jti, self.ttl)
            .await;

        self.mail
            .publish(EmailMessage {
                to: user.email,
                kind: EmailKind::PasswordReset {
                    token: issued.token,
                },
            })
            .await?;
        info!(user_id = user.id, "Password reset issued");
        Ok(())
    }

    /// Set a new password using a token from [`Self::forgot_password`].
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> ServiceResult<()> {
        let claims = self.jwt.validate(token).map_err(|e| {
            debug!(error = %e, "Rejected reset token");
            ServiceError::InvalidToken
        })?;
        if !claims.is_password_reset() || claims.jti.is_empty() {
            return Err(ServiceError::InvalidToken);
        }
        let user_id = claims.user_id().ok_or(ServiceError::InvalidToken)?;

        let key = record_key(user_id);
        let current = self
            .cache
            .get(NAMESPACE, &key)
            .await?
            .ok_or(ServiceError::DeprecatedToken)?;
        if current != claims.jti {
            return Err(ServiceError::InvalidToken);
        }

        validate::new_password(new_password)?;
        let hash = hash_secret(new_password).map_err(ServiceError::internal)?;
        if !self
            .db
            .patch_user(user_id, UserPatch::PasswordHash(hash))
            .await?
        {
            return Err(ServiceError::UserNotFound);
        }
        self.cache.delete(NAMESPACE, &key).await;
        info!(user_id, "Password reset");
        Ok(())
    }
}
