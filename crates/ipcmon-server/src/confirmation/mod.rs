//! Confirmation workflow for sensitive account actions and password reset.

pub mod action;
pub mod password_reset;
pub mod workflow;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests;

pub use action::{ConfirmationAction, PendingEdit, UserUpdate};
pub use password_reset::PasswordResetService;
pub use workflow::ConfirmationService;
