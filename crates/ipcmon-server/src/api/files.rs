//! `/v1/files` routes.

use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use ipcmon_core::config::StorageConfig;

use super::AppState;
use super::extract::CurrentUser;
use super::response::{Envelope, data};
use crate::error::{ServiceError, ServiceResult};
use crate::files::{Folder, Upload};
use crate::storage::FileRecord;

const FILE_FIELD: &str = "file";

pub fn files_router() -> Router<AppState> {
    Router::new()
        .route("/file", post(upload))
        .route("/file/{key}", get(download_upload).delete(delete))
        .route("/presets/{key}", get(download_preset))
}

/// Body limit for routes that accept uploads: the file plus room for the
/// multipart envelope.
pub fn upload_body_limit(settings: &StorageConfig) -> usize {
    usize::try_from(settings.max_size_bytes() + 64 * 1024).unwrap_or(usize::MAX)
}

fn multipart_error(e: &MultipartError, max_mb: u64) -> ServiceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::FileTooLarge { max_mb }
    } else {
        ServiceError::Validation(e.body_text())
    }
}

/// Read the `file` field of a multipart body.
pub async fn read_upload(mut multipart: Multipart, max_mb: u64) -> ServiceResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e, max_mb))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(ToString::to_string);
        let content_type = field.content_type().map(ToString::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(&e, max_mb))?;
        return Ok(Upload {
            filename,
            content_type,
            data,
        });
    }
    Err(ServiceError::Validation(format!(
        "multipart field `{FILE_FIELD}` is required"
    )))
}

async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> ServiceResult<(StatusCode, Json<Envelope<FileRecord>>)> {
    let upload = read_upload(multipart, state.files.max_size_mb()).await?;
    let record = state.files.upload(user.user_id, upload).await?;
    Ok((StatusCode::CREATED, data(record)))
}

async fn stream_response(state: &AppState, folder: Folder, key: &str) -> ServiceResult<Response> {
    let download = state.files.open(folder, key).await?;
    let body = Body::from_stream(state.files.stream(&download));
    Response::builder()
        .header(header::CONTENT_TYPE, &download.content_type)
        .header(header::CONTENT_LENGTH, download.size)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_DISPOSITION, download.content_disposition())
        .body(body)
        .map_err(ServiceError::internal)
}

async fn download_upload(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(key): Path<String>,
) -> ServiceResult<Response> {
    stream_response(&state, Folder::Uploads, &key).await
}

async fn download_preset(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServiceResult<Response> {
    stream_response(&state, Folder::Presets, &key).await
}

async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(key): Path<String>,
) -> ServiceResult<StatusCode> {
    state.files.delete(user.user_id, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
