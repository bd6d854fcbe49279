//! `/v1/users` and `/v1/emails` routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use super::extract::{CurrentUser, removal_cookie, session_cookie};
use super::files::read_upload;
use super::response::{Envelope, data, message};
use crate::confirmation::{ConfirmationAction, UserUpdate};
use crate::error::ServiceResult;
use crate::users::{Credentials, UserInfo};

type Reply = ServiceResult<Json<Envelope<()>>>;

pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/edit", post(edit))
        .route("/delete", delete(request_deletion))
        .route("/verify-email", post(verify_email))
        .route("/change-avatar", patch(change_avatar))
        .route("/forgot-password", post(forgot_password))
        .route("/{id}", get(user_by_id))
}

pub fn emails_router() -> Router<AppState> {
    Router::new()
        .route("/confirm", post(confirm))
        .route("/reset-password", patch(reset_password))
}

async fn sign_up(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ServiceResult<(StatusCode, CookieJar, Json<Envelope<()>>)> {
    let Json(credentials) = payload?;
    let session_id = state.users.sign_up(&credentials).await?;
    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(&state.cookie, session_id)),
        message("User created"),
    ))
}

async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ServiceResult<(CookieJar, Json<Envelope<()>>)> {
    let Json(credentials) = payload?;
    let session_id = state.users.sign_in(&credentials).await?;
    Ok((
        jar.add(session_cookie(&state.cookie, session_id)),
        message("Signed in"),
    ))
}

async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    jar: CookieJar,
) -> (CookieJar, Json<Envelope<()>>) {
    state.users.logout(&user.session_id).await;
    info!(user_id = user.user_id, "Logged out");
    (jar.remove(removal_cookie(&state.cookie)), message("Logged out"))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> ServiceResult<Json<Envelope<UserInfo>>> {
    Ok(data(state.users.info(user.user_id).await?))
}

async fn user_by_id(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Envelope<UserInfo>>> {
    Ok(data(state.users.info(id).await?))
}

async fn edit(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> Reply {
    let Json(update) = payload?;
    state.users.request_edit(user.user_id, update).await?;
    Ok(message("Confirmation code sent"))
}

async fn request_deletion(State(state): State<AppState>, user: CurrentUser) -> Reply {
    state.users.request_deletion(user.user_id).await?;
    Ok(message("Confirmation code sent"))
}

async fn verify_email(State(state): State<AppState>, user: CurrentUser) -> Reply {
    state.users.request_email_verification(user.user_id).await?;
    Ok(message("Confirmation code sent"))
}

#[derive(Debug, Serialize)]
struct AvatarChanged {
    avatar_url: String,
}

async fn change_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> ServiceResult<Json<Envelope<AvatarChanged>>> {
    let upload = read_upload(multipart, state.files.max_size_mb()).await?;
    let avatar_url = state.users.change_avatar(user.user_id, upload).await?;
    Ok(data(AvatarChanged { avatar_url }))
}

#[derive(Debug, Deserialize)]
struct ForgotPassword {
    email: String,
}

async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPassword>, JsonRejection>,
) -> Reply {
    let Json(request) = payload?;
    state.password_reset.forgot_password(&request.email).await?;
    Ok(message("Password reset link sent"))
}

#[derive(Debug, Deserialize)]
struct ConfirmCode {
    code: String,
}

async fn confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    jar: CookieJar,
    payload: Result<Json<ConfirmCode>, JsonRejection>,
) -> ServiceResult<(CookieJar, Json<Envelope<()>>)> {
    let Json(request) = payload?;
    let action = state
        .confirmations
        .verify_code(user.user_id, &request.code)
        .await?;

    if action == ConfirmationAction::DeleteUser {
        state.users.logout(&user.session_id).await;
        return Ok((jar.remove(removal_cookie(&state.cookie)), message("User deleted")));
    }
    Ok((jar, message("Confirmed")))
}

#[derive(Debug, Deserialize)]
struct ResetPassword {
    token: String,
    password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPassword>, JsonRejection>,
) -> Reply {
    let Json(request) = payload?;
    state
        .password_reset
        .reset_password(&request.token, &request.password)
        .await?;
    Ok(message("Password updated"))
}
