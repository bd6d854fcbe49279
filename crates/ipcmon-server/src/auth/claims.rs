//! Claims carried by password-reset tokens.

use serde::{Deserialize, Serialize};

pub const PASSWORD_RESET_SCOPE: &str = "password_reset";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    /// JWT ID, mirrored in the cache so a token can be used once.
    pub jti: String,
    /// Subject (user ID).
    pub sub: String,
    pub scope: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl ResetClaims {
    pub fn is_password_reset(&self) -> bool {
        self.scope == PASSWORD_RESET_SCOPE
    }

    /// Subject parsed as a user id.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}
