//! Password-reset token issuance and validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use super::claims::{PASSWORD_RESET_SCOPE, ResetClaims};

/// A freshly signed reset token together with the values the caller has to
/// mirror server-side.
#[derive(Debug, Clone)]
pub struct IssuedResetToken {
    pub token: String,
    pub jti: String,
    pub ttl_secs: i64,
}

/// Signs and verifies password-reset JWTs.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Issue a reset token for the given user.
    pub fn issue_reset_token(
        &self,
        user_id: i64,
    ) -> Result<IssuedResetToken, jsonwebtoken::errors::Error> {
        let now = now_secs();
        let jti = uuid::Uuid::new_v4().simple().to_string();

        let claims = ResetClaims {
            jti: jti.clone(),
            sub: user_id.to_string(),
            scope: PASSWORD_RESET_SCOPE.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(IssuedResetToken {
            token,
            jti,
            ttl_secs: self.ttl_secs,
        })
    }

    /// Verify signature and expiry and return the claims. Scope is left to
    /// the caller.
    pub fn validate(&self, token: &str) -> Result<ResetClaims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<ResetClaims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

fn now_secs() -> i64 {
    ipcmon_core::db::unix_timestamp()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_jwt() -> JwtManager {
        JwtManager::new(b"test-secret-key-for-testing", 900)
    }

    #[test]
    fn issue_and_validate_reset_token() {
        let jwt = test_jwt();
        let issued = jwt.issue_reset_token(7).unwrap();
        assert_eq!(issued.ttl_secs, 900);
        assert_eq!(issued.jti.len(), 32);

        let claims = jwt.validate(&issued.token).unwrap();
        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.jti, issued.jti);
        assert!(claims.is_password_reset());
    }

    #[test]
    fn each_token_gets_its_own_jti() {
        let jwt = test_jwt();
        let a = jwt.issue_reset_token(7).unwrap();
        let b = jwt.issue_reset_token(7).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_fails_validation() {
        let token = test_jwt().issue_reset_token(7).unwrap().token;
        let other = JwtManager::new(b"different-secret", 900);
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn expired_token_fails_validation() {
        let jwt = JwtManager::new(b"test-secret-key-for-testing", -3600);
        let token = jwt.issue_reset_token(7).unwrap().token;
        assert!(jwt.validate(&token).is_err());
    }

    #[test]
    fn garbage_fails_validation() {
        assert!(test_jwt().validate("not-a-valid-token").is_err());
    }
}
