//! HTTP and WebSocket surface of the ipcmon server.

pub mod devices;
pub mod extract;
pub mod files;
pub mod response;
pub mod users;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use ipcmon_core::config::{Config, CookieConfig};
use ipcmon_core::{Cache, Clock};
use tower_http::trace::TraceLayer;

use crate::auth::SessionStore;
use crate::confirmation::{ConfirmationService, PasswordResetService};
use crate::devices::DeviceService;
use crate::files::{FileService, ObjectStore};
use crate::mail::EmailQueue;
use crate::provisioning::ProvisioningService;
use crate::storage::ServerDatabase;
use crate::users::UserService;

pub use extract::CurrentUser;

/// Service handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub db: ServerDatabase,
    pub clock: Arc<dyn Clock>,
    pub cookie: CookieConfig,
    pub sessions: SessionStore,
    pub users: UserService,
    pub confirmations: ConfirmationService,
    pub password_reset: PasswordResetService,
    pub provisioning: ProvisioningService,
    pub devices: DeviceService,
    pub files: FileService,
}

impl AppState {
    /// Wire every service from configuration and the process-wide handles.
    pub fn new(
        config: &Config,
        db: ServerDatabase,
        cache: Cache,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ObjectStore>,
        mail: EmailQueue,
    ) -> Self {
        let sessions = SessionStore::new(cache.clone(), config.cookie.max_age());
        let files = FileService::new(
            db.clone(),
            store,
            config.storage.clone(),
            config.server.public_url.clone(),
        );
        let confirmations = ConfirmationService::new(
            db.clone(),
            cache.clone(),
            mail.clone(),
            config.verification.clone(),
        );
        let password_reset =
            PasswordResetService::new(db.clone(), cache.clone(), mail, &config.password_reset);
        let users = UserService::new(
            db.clone(),
            sessions.clone(),
            files.clone(),
            confirmations.clone(),
        );
        let provisioning =
            ProvisioningService::new(db.clone(), cache, config.provisioning.clone());

        Self {
            devices: DeviceService::new(db.clone()),
            db,
            clock,
            cookie: config.cookie.clone(),
            sessions,
            users,
            confirmations,
            password_reset,
            provisioning,
            files,
        }
    }
}

/// Build the versioned router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(files::upload_body_limit(state.files.settings()));

    let v1 = Router::new()
        .nest("/users", users::users_router().layer(body_limit.clone()))
        .nest("/emails", users::emails_router())
        .nest("/devices", devices::devices_router())
        .nest("/telemetry", devices::telemetry_router())
        .nest("/files", files::files_router().layer(body_limit));

    Router::new()
        .nest("/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
