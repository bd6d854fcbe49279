//! Session cookie extraction and construction.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use ipcmon_core::config::CookieConfig;

use super::AppState;
use crate::error::ServiceError;

/// The signed-in user behind the request's session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub session_id: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = jar
            .get(&state.cookie.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ServiceError::MissingSessionCookie)?;

        let user_id = state
            .sessions
            .resolve(&session_id)
            .await
            .ok_or(ServiceError::InvalidSessionCookie)?;

        Ok(Self {
            user_id,
            session_id,
        })
    }
}

pub fn session_cookie(settings: &CookieConfig, session_id: String) -> Cookie<'static> {
    let max_age = i64::try_from(settings.max_age().as_secs()).unwrap_or(i64::MAX);
    Cookie::build((settings.name.clone(), session_id))
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

pub fn removal_cookie(settings: &CookieConfig) -> Cookie<'static> {
    Cookie::build((settings.name.clone(), "")).path("/").build()
}
