//! Confirmation workflow and password reset tests.

use std::sync::Arc;
use std::time::Duration;

use ipcmon_core::config::{PasswordResetConfig, VerificationConfig};
use ipcmon_core::{Cache, ManualClock};
use jsonwebtoken::{EncodingKey, Header};
use tokio::sync::mpsc;

use super::*;
use crate::auth::ResetClaims;
use crate::auth::password::{hash_secret, verify_secret};
use crate::error::ServiceError;
use crate::mail::{EmailKind, EmailMessage, EmailQueue};
use crate::storage::{ServerDatabase, User, UserPatch};

struct Fixture {
    db: ServerDatabase,
    cache: Cache,
    clock: ManualClock,
    confirmations: ConfirmationService,
    resets: PasswordResetService,
    outbox: mpsc::Receiver<EmailMessage>,
}

async fn fixture() -> Fixture {
    let db = ServerDatabase::open_in_memory().await.unwrap();
    let clock = ManualClock::new();
    let cache = Cache::new(Arc::new(clock.clone()));
    let (mail, outbox) = EmailQueue::new(16);
    let confirmations = ConfirmationService::new(
        db.clone(),
        cache.clone(),
        mail.clone(),
        VerificationConfig::default(),
    );
    let resets =
        PasswordResetService::new(db.clone(), cache.clone(), mail, &PasswordResetConfig::default());
    Fixture {
        db,
        cache,
        clock,
        confirmations,
        resets,
        outbox,
    }
}

impl Fixture {
    async fn user(&self, email: &str, verified: bool) -> User {
        let hash = hash_secret("old-password").unwrap();
        let user = self
            .db
            .create_user("someone", email, &hash, "default.webp")
            .await
            .unwrap();
        if verified {
            self.db
                .patch_user(user.id, UserPatch::EmailVerified(true))
                .await
                .unwrap();
        }
        self.db.get_user(user.id).await.unwrap()
    }

    async fn issue(&mut self, user: &User, action: ConfirmationAction) -> String {
        self.confirmations.request(user, &action).await.unwrap();
        match self.outbox.try_recv().unwrap().kind {
            EmailKind::ConfirmationCode { code } => code,
            other => panic!("unexpected email {other:?}"),
        }
    }

    async fn reset_token(&mut self, email: &str) -> String {
        self.resets.forgot_password(email).await.unwrap();
        match self.outbox.try_recv().unwrap().kind {
            EmailKind::PasswordReset { token } => token,
            other => panic!("unexpected email {other:?}"),
        }
    }

    async fn record(&self, user_id: i64) -> Option<std::collections::HashMap<String, String>> {
        self.cache
            .hgetall("confirm", &format!("user:{user_id}"))
            .await
            .unwrap()
    }
}

// =========================================================================
// Confirmation codes
// =========================================================================

#[tokio::test]
async fn email_verification_is_one_time() {
    let mut fx = fixture().await;
    let user = fx.user("a@example.com", false).await;
    let code = fx.issue(&user, ConfirmationAction::VerifyEmail).await;

    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    let stored = fx.record(user.id).await.unwrap();
    assert_ne!(stored["code"], code);
    assert_eq!(stored["action"], "email_verification");
    assert_eq!(stored["attempts"], "3");

    let action = fx.confirmations.verify_code(user.id, &code).await.unwrap();
    assert_eq!(action, ConfirmationAction::VerifyEmail);
    assert!(fx.db.get_user(user.id).await.unwrap().email_verified);

    assert!(matches!(
        fx.confirmations.verify_code(user.id, &code).await,
        Err(ServiceError::InvalidToken)
    ));
}

#[tokio::test]
async fn attempts_run_out_on_the_last_wrong_code() {
    let mut fx = fixture().await;
    let user = fx.user("a@example.com", false).await;
    let code = fx.issue(&user, ConfirmationAction::VerifyEmail).await;

    for left in ["2", "1"] {
        assert!(matches!(
            fx.confirmations.verify_code(user.id, "wrong").await,
            Err(ServiceError::InvalidToken)
        ));
        assert_eq!(fx.record(user.id).await.unwrap()["attempts"], left);
    }
    assert!(matches!(
        fx.confirmations.verify_code(user.id, "wrong").await,
        Err(ServiceError::TooManyAttempts)
    ));
    assert!(fx.record(user.id).await.is_none());

    assert!(matches!(
        fx.confirmations.verify_code(user.id, &code).await,
        Err(ServiceError::InvalidToken)
    ));
    assert!(!fx.db.get_user(user.id).await.unwrap().email_verified);
}

#[tokio::test]
async fn wrong_code_keeps_the_original_expiry() {
    let mut fx = fixture().await;
    let user = fx.user("a@example.com", false).await;
    let code = fx.issue(&user, ConfirmationAction::VerifyEmail).await;

    fx.clock.advance(Duration::from_secs(300));
    assert!(fx.confirmations.verify_code(user.id, "wrong").await.is_err());
    fx.clock.advance(Duration::from_secs(301));

    assert!(matches!(
        fx.confirmations.verify_code(user.id, &code).await,
        Err(ServiceError::InvalidToken)
    ));
}

#[tokio::test]
async fn newer_request_replaces_the_outstanding_one() {
    let mut fx = fixture().await;
    let user = fx.user("a@example.com", true).await;
    fx.issue(&user, ConfirmationAction::VerifyEmail).await;
    let code = fx.issue(&user, ConfirmationAction::DeleteUser).await;

    assert_eq!(fx.record(user.id).await.unwrap()["action"], "user_deletion");
    let action = fx.confirmations.verify_code(user.id, &code).await.unwrap();
    assert_eq!(action, ConfirmationAction::DeleteUser);
    assert!(fx.db.get_user(user.id).await.is_err());
}

#[tokio::test]
async fn edit_applies_the_deferred_update() {
    let mut fx = fixture().await;
    let user = fx.user("a@example.com", true).await;
    let pending = UserUpdate {
        email: Some("b@example.com".into()),
        password: Some("new-password".into()),
        ..UserUpdate::default()
    }
    .into_pending()
    .unwrap();
    let code = fx
        .issue(&user, ConfirmationAction::EditUser(pending.clone()))
        .await;
    let payload = fx.record(user.id).await.unwrap()["payload"].clone();
    assert_eq!(payload, serde_json::to_string(&pending).unwrap());
    assert!(!payload.contains("new-password"));

    fx.confirmations.verify_code(user.id, &code).await.unwrap();

    let edited = fx.db.get_user(user.id).await.unwrap();
    assert_eq!(edited.email, "b@example.com");
    assert_eq!(edited.username, "someone");
    assert!(!edited.email_verified);
    assert!(verify_secret("new-password", &edited.password_hash).unwrap());
}

#[tokio::test]
async fn edit_to_a_taken_email_conflicts() {
    let mut fx = fixture().await;
    fx.user("taken@example.com", true).await;
    let user = fx.user("a@example.com", true).await;
    let pending = UserUpdate {
        email: Some("taken@example.com".into()),
        ..UserUpdate::default()
    }
    .into_pending()
    .unwrap();
    let code = fx.issue(&user, ConfirmationAction::EditUser(pending)).await;

    assert!(matches!(
        fx.confirmations.verify_code(user.id, &code).await,
        Err(ServiceError::UserAlreadyExists)
    ));
}

#[tokio::test]
async fn unreadable_action_is_rejected_and_consumed() {
    let fx = fixture().await;
    let user = fx.user("a@example.com", true).await;
    let record = std::collections::HashMap::from([
        ("action".to_string(), "promote".to_string()),
        ("code".to_string(), hash_secret("123456").unwrap()),
        ("attempts".to_string(), "3".to_string()),
    ]);
    fx.cache
        .hset("confirm", &format!("user:{}", user.id), record, Duration::from_secs(60))
        .await;

    assert!(matches!(
        fx.confirmations.verify_code(user.id, "123456").await,
        Err(ServiceError::InvalidToken)
    ));
    assert!(fx.record(user.id).await.is_none());
}

// =========================================================================
// Password reset
// =========================================================================

#[tokio::test]
async fn reset_token_works_once() {
    let mut fx = fixture().await;
    let user = fx.user("a@example.com", true).await;
    let token = fx.reset_token("a@example.com").await;

    fx.resets
        .reset_password(&token, "brand-new-pass")
        .await
        .unwrap();
    let updated = fx.db.get_user(user.id).await.unwrap();
    assert!(verify_secret("brand-new-pass", &updated.password_hash).unwrap());

    assert!(matches!(
        fx.resets.reset_password(&token, "another-pass").await,
        Err(ServiceError::DeprecatedToken)
    ));
}

#[tokio::test]
async fn only_the_latest_reset_token_is_accepted() {
    let mut fx = fixture().await;
    fx.user("a@example.com", true).await;
    let first = fx.reset_token("a@example.com").await;
    let second = fx.reset_token("a@example.com").await;

    assert!(matches!(
        fx.resets.reset_password(&first, "brand-new-pass").await,
        Err(ServiceError::InvalidToken)
    ));
    fx.resets
        .reset_password(&second, "brand-new-pass")
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_requires_a_known_verified_email() {
    let fx = fixture().await;
    fx.user("a@example.com", false).await;

    assert!(matches!(
        fx.resets.forgot_password("a@example.com").await,
        Err(ServiceError::EmailNotVerified)
    ));
    assert!(matches!(
        fx.resets.forgot_password("nobody@example.com").await,
        Err(ServiceError::UserNotFound)
    ));
}

#[tokio::test]
async fn forged_or_foreign_tokens_are_invalid() {
    let fx = fixture().await;
    let user = fx.user("a@example.com", true).await;

    assert!(matches!(
        fx.resets.reset_password("not-a-jwt", "brand-new-pass").await,
        Err(ServiceError::InvalidToken)
    ));

    let now = ipcmon_core::db::unix_timestamp();
    let claims = ResetClaims {
        jti: "abc".into(),
        sub: user.id.to_string(),
        scope: "email_verification".into(),
        iat: now,
        exp: now + 600,
    };
    let secret = PasswordResetConfig::default().jwt_secret;
    let wrong_scope = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();
    assert!(matches!(
        fx.resets.reset_password(&wrong_scope, "brand-new-pass").await,
        Err(ServiceError::InvalidToken)
    ));

    let other_key = jsonwebtoken::encode(
        &Header::default(),
        &ResetClaims {
            scope: "password_reset".into(),
            ..claims
        },
        &EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();
    assert!(matches!(
        fx.resets.reset_password(&other_key, "brand-new-pass").await,
        Err(ServiceError::InvalidToken)
    ));
}
