//! Authentication primitives for the ipcmon server.
//!
//! Provides argon2 hashing for passwords and confirmation codes, cookie
//! sessions backed by the expiring cache, and password-reset JWTs.

pub mod claims;
pub mod jwt;
pub mod password;
pub mod session;

pub use claims::ResetClaims;
pub use jwt::{IssuedResetToken, JwtManager};
pub use session::SessionStore;
