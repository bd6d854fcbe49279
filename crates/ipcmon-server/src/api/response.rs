//! HTTP mapping of service results.
//!
//! Successful responses are wrapped as
//! `{"status": "success", "message"?: ..., "data"?: ...}` and failures as
//! `{"status": "error", "detail": ...}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::error::{ErrorKind, ServiceError};

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

pub fn data<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        message: None,
        data: Some(data),
    })
}

pub fn message(message: &'static str) -> Json<Envelope<()>> {
    Json(Envelope {
        status: "success",
        message: Some(message),
        data: None,
    })
}

impl ServiceError {
    pub const fn as_status_code(&self) -> StatusCode {
        match self {
            Self::UserNotFound | Self::DeviceNotFound | Self::FileNotFound => StatusCode::NOT_FOUND,
            Self::UserAlreadyExists | Self::DeviceAlreadyExists => StatusCode::CONFLICT,
            Self::MissingSessionCookie | Self::InvalidSessionCookie | Self::UserWrongPassword => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotAuthorized | Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::InvalidToken | Self::EmptyFile => StatusCode::BAD_REQUEST,
            Self::DeprecatedToken => StatusCode::GONE,
            Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::FileUploadFailed(_) | Self::FileDeleteFailed(_) | Self::StreamingFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::InvalidMetadata | Self::Database(_) | Self::Cache(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();
        let detail = match self.kind() {
            ErrorKind::Internal => {
                error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            ErrorKind::UpstreamFailure => {
                warn!(error = %self, source = ?std::error::Error::source(&self), "Object store failure");
                self.to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(json!({"status": "error", "detail": detail}))).into_response()
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
