//! Claim tokens and device binding.

use ipcmon_core::Cache;
use ipcmon_core::config::ProvisioningConfig;
use tracing::{info, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::storage::{DatabaseError, Device, ServerDatabase};

const NAMESPACE: &str = "devices";

/// Longest display name a device may carry, in characters.
pub const MAX_NAME_LEN: usize = 16;

/// Issues claim tokens and redeems them into devices.
#[derive(Clone)]
pub struct ProvisioningService {
    db: ServerDatabase,
    cache: Cache,
    settings: ProvisioningConfig,
}

impl ProvisioningService {
    pub const fn new(db: ServerDatabase, cache: Cache, settings: ProvisioningConfig) -> Self {
        Self {
            db,
            cache,
            settings,
        }
    }

    pub const fn settings(&self) -> &ProvisioningConfig {
        &self.settings
    }

    /// Issue a claim token for a device that is not registered yet.
    #[instrument(skip(self))]
    pub async fn get_token(&self, name: &str) -> ServiceResult<String> {
        let len = name.chars().count();
        if len == 0 || len > MAX_NAME_LEN {
            return Err(ServiceError::Validation(format!(
                "Device name must be 1 to {MAX_NAME_LEN} characters"
            )));
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        self.cache
            .set(NAMESPACE, &token, name, self.settings.claim_ttl())
            .await;
        info!("Claim token issued");
        Ok(token)
    }

    /// Redeem a claim token into a device owned by `user_id`. The token
    /// becomes the device's permanent credential and the claim is consumed.
    #[instrument(skip(self, token))]
    pub async fn add_device(&self, user_id: i64, token: &str) -> ServiceResult<Device> {
        let name = self
            .cache
            .get(NAMESPACE, token)
            .await?
            .ok_or(ServiceError::DeprecatedToken)?;

        let device = match self.db.create_device(user_id, &name, token).await {
            Ok(device) => device,
            Err(DatabaseError::Conflict(_)) => return Err(ServiceError::DeviceAlreadyExists),
            Err(e) => return Err(e.into()),
        };
        self.cache.delete(NAMESPACE, token).await;

        info!(device_id = device.id, name = %device.name, "Device added");
        Ok(device)
    }

    /// The device already bound to `token`, if any.
    pub async fn find_device(&self, token: &str) -> ServiceResult<Option<Device>> {
        Ok(self.db.get_device_by_token(token).await?)
    }

    /// Whether `token` was issued and has been neither redeemed nor expired.
    pub async fn is_pending(&self, token: &str) -> bool {
        self.cache.exists(NAMESPACE, token).await
    }
}
