//! Domain errors raised by the ipcmon services.
//!
//! Services return `ServiceError` unchanged up to the HTTP boundary, which
//! maps every variant to exactly one status code.

use ipcmon_core::CacheError;
use ipcmon_core::db::DatabaseError;

use crate::files::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Coarse failure classes used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    TokenLifecycle,
    ResourceLimits,
    UpstreamFailure,
    Validation,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("User not found")]
    UserNotFound,
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("Wrong password")]
    UserWrongPassword,
    #[error("Email is not verified")]
    EmailNotVerified,

    #[error("Session cookie is missing")]
    MissingSessionCookie,
    #[error("Session cookie is invalid or expired")]
    InvalidSessionCookie,
    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Device not found")]
    DeviceNotFound,
    #[error("Device already exists")]
    DeviceAlreadyExists,

    #[error("Token is expired or was never issued")]
    DeprecatedToken,
    #[error("Invalid token or code")]
    InvalidToken,
    #[error("Too many attempts")]
    TooManyAttempts,

    #[error("File not found")]
    FileNotFound,
    #[error("File is empty")]
    EmptyFile,
    #[error("File exceeds the {max_mb} MB limit")]
    FileTooLarge { max_mb: u64 },
    #[error("Unsupported media type")]
    UnsupportedMediaType,
    #[error("File upload failed")]
    FileUploadFailed(#[source] StoreError),
    #[error("File deletion failed")]
    FileDeleteFailed(#[source] StoreError),
    #[error("File streaming failed")]
    StreamingFailed(#[source] StoreError),
    #[error("File metadata is missing or invalid")]
    InvalidMetadata,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound | Self::DeviceNotFound | Self::FileNotFound => ErrorKind::NotFound,
            Self::UserAlreadyExists | Self::DeviceAlreadyExists => ErrorKind::Conflict,
            Self::UserWrongPassword
            | Self::EmailNotVerified
            | Self::MissingSessionCookie
            | Self::InvalidSessionCookie
            | Self::NotAuthorized => ErrorKind::Unauthorized,
            Self::DeprecatedToken | Self::InvalidToken | Self::TooManyAttempts => {
                ErrorKind::TokenLifecycle
            }
            Self::EmptyFile | Self::FileTooLarge { .. } | Self::UnsupportedMediaType => {
                ErrorKind::ResourceLimits
            }
            Self::FileUploadFailed(_) | Self::FileDeleteFailed(_) | Self::StreamingFailed(_) => {
                ErrorKind::UpstreamFailure
            }
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidMetadata | Self::Database(_) | Self::Cache(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }

    /// Translate a storage miss into the given domain error.
    pub(crate) fn from_lookup(e: DatabaseError, missing: Self) -> Self {
        match e {
            DatabaseError::NotFound(_) => missing,
            other => Self::Database(other),
        }
    }
}
