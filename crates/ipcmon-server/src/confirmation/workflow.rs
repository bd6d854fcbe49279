//! One-time confirmation codes for sensitive account actions.
//!
//! A user has at most one outstanding confirmation. It is stored as a cache
//! hash under `confirm:user:{id}`:
//!
//! | field      | value                                  |
//! |------------|----------------------------------------|
//! | `action`   | action tag                             |
//! | `code`     | argon2 hash of the code                |
//! | `attempts` | wrong guesses left                     |
//! | `payload`  | JSON for deferred edits, else empty    |

use std::collections::HashMap;

use ipcmon_core::Cache;
use ipcmon_core::config::VerificationConfig;
use rand::RngExt;
use tracing::{debug, info, instrument, warn};

use super::action::{ConfirmationAction, PendingEdit};
use crate::auth::password::{hash_secret, verify_secret};
use crate::error::{ServiceError, ServiceResult};
use crate::mail::{EmailKind, EmailMessage, EmailQueue};
use crate::storage::{DatabaseError, ProfileChanges, ServerDatabase, User, UserPatch};

const NAMESPACE: &str = "confirm";

const FIELD_ACTION: &str = "action";
const FIELD_CODE: &str = "code";
const FIELD_ATTEMPTS: &str = "attempts";
const FIELD_PAYLOAD: &str = "payload";

fn record_key(user_id: i64) -> String {
    format!("user:{user_id}")
}

/// Numeric code of `len` digits.
fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len.max(1))
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

#[derive(Clone)]
pub struct ConfirmationService {
    db: ServerDatabase,
    cache: Cache,
    mail: EmailQueue,
    settings: VerificationConfig,
}

impl ConfirmationService {
    pub const fn new(
        db: ServerDatabase,
        cache: Cache,
        mail: EmailQueue,
        settings: VerificationConfig,
    ) -> Self {
        Self {
            db,
            cache,
            mail,
            settings,
        }
    }

    /// Issue a code for `action` and mail it to the user. Replaces any
    /// confirmation the user already had outstanding.
    #[instrument(skip(self, user, action), fields(user_id = user.id, action = action.tag()))]
    pub async fn request(&self, user: &User, action: &ConfirmationAction) -> ServiceResult<()> {
        let code = generate_code(self.settings.code_length);
        let code_hash = hash_secret(&code).map_err(ServiceError::internal)?;
        let payload = action.payload().map_err(ServiceError::internal)?;

        let record = HashMap::from([
            (FIELD_ACTION.to_string(), action.tag().to_string()),
            (FIELD_CODE.to_string(), code_hash),
            (FIELD_ATTEMPTS.to_string(), self.settings.attempts.to_string()),
            (FIELD_PAYLOAD.to_string(), payload),
        ]);
        self.cache
            .hset(NAMESPACE, &record_key(user.id), record, self.settings.ttl())
            .await;

        self.mail
            .publish(EmailMessage {
                to: user.email.clone(),
                kind: EmailKind::ConfirmationCode { code },
            })
            .await?;
        info!("Confirmation code issued");
        Ok(())
    }

    /// Check a code and, on success, apply the pending action.
    ///
    /// A wrong code costs one attempt; the last attempt deletes the record.
    /// A correct code is consumed before the action runs.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, user_id: i64, code: &str) -> ServiceResult<ConfirmationAction> {
        let key = record_key(user_id);
        let record = self
            .cache
            .hgetall(NAMESPACE, &key)
            .await?
            .ok_or(ServiceError::InvalidToken)?;
        let code_hash = record.get(FIELD_CODE).ok_or(ServiceError::InvalidToken)?;

        if !verify_secret(code, code_hash).map_err(ServiceError::internal)? {
            let remaining = self
                .cache
                .hincr(NAMESPACE, &key, FIELD_ATTEMPTS, -1)
                .await?;
            return match remaining {
                Some(left) if left > 0 => {
                    debug!(left, "Wrong confirmation code");
                    Err(ServiceError::InvalidToken)
                }
                Some(_) => {
                    self.cache.delete(NAMESPACE, &key).await;
                    warn!("Confirmation attempts exhausted");
                    Err(ServiceError::TooManyAttempts)
                }
                None => Err(ServiceError::InvalidToken),
            };
        }

        self.cache.delete(NAMESPACE, &key).await;
        let action = ConfirmationAction::from_stored(
            record.get(FIELD_ACTION).map(String::as_str),
            record.get(FIELD_PAYLOAD).map(String::as_str),
        )
        .ok_or(ServiceError::InvalidToken)?;

        self.apply(user_id, &action).await?;
        info!(action = action.tag(), "Confirmation accepted");
        Ok(action)
    }

    async fn apply(&self, user_id: i64, action: &ConfirmationAction) -> ServiceResult<()> {
        match action {
            ConfirmationAction::VerifyEmail => {
                if !self
                    .db
                    .patch_user(user_id, UserPatch::EmailVerified(true))
                    .await?
                {
                    return Err(ServiceError::UserNotFound);
                }
            }
            ConfirmationAction::DeleteUser => {
                if !self.db.delete_user(user_id).await? {
                    return Err(ServiceError::UserNotFound);
                }
            }
            ConfirmationAction::EditUser(edit) => self.edit_user(user_id, edit).await?,
        }
        Ok(())
    }

    async fn edit_user(&self, user_id: i64, edit: &PendingEdit) -> ServiceResult<()> {
        let changes = ProfileChanges {
            email: edit.email.clone(),
            username: edit.username.clone(),
            avatar: edit.avatar.clone(),
            password_hash: edit.password_hash.clone(),
        };
        match self.db.update_profile(user_id, &changes).await {
            Ok(_) => Ok(()),
            Err(DatabaseError::Conflict(_)) => Err(ServiceError::UserAlreadyExists),
            Err(e) => Err(ServiceError::from_lookup(e, ServiceError::UserNotFound)),
        }
    }
}
