//! Field rules shared by the request payloads.

use crate::error::{ServiceError, ServiceResult};

pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 32;

fn length(field: &str, value: &str, min: usize, max: usize) -> ServiceResult<()> {
    let len = value.chars().count();
    if (min..=max).contains(&len) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "{field} must be {min} to {max} characters"
        )))
    }
}

pub fn email(value: &str) -> ServiceResult<()> {
    length("email", value, 4, 255)?;
    let well_formed = !value.chars().any(char::is_whitespace)
        && value.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && domain.split('.').all(|label| !label.is_empty() && !label.contains('@'))
        });
    if well_formed {
        Ok(())
    } else {
        Err(ServiceError::Validation("email is not a valid address".into()))
    }
}

/// Passwords at sign-up and sign-in have no upper bound.
pub fn password(value: &str) -> ServiceResult<()> {
    length("password", value, PASSWORD_MIN, usize::MAX)
}

/// Passwords set through a profile edit or a reset.
pub fn new_password(value: &str) -> ServiceResult<()> {
    length("password", value, PASSWORD_MIN, PASSWORD_MAX)
}

pub fn username(value: &str) -> ServiceResult<()> {
    length("username", value, 4, 32)
}

pub fn avatar(value: &str) -> ServiceResult<()> {
    length("avatar", value, 4, 255)
}
