//! Owner-scoped device registry and telemetry queries.

use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::storage::{Device, ServerDatabase, TelemetryOrder, TelemetryPage, TelemetrySample};

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Query string of a telemetry request.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TelemetryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order: Option<TelemetryOrder>,
}

impl TelemetryQuery {
    pub fn page(self) -> ServiceResult<TelemetryPage> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0);
        if limit <= 0 {
            return Err(ServiceError::Validation("limit must be positive".into()));
        }
        if offset < 0 {
            return Err(ServiceError::Validation("offset must not be negative".into()));
        }
        Ok(TelemetryPage {
            limit,
            offset,
            order: self.order.unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct DeviceService {
    db: ServerDatabase,
}

impl DeviceService {
    pub const fn new(db: ServerDatabase) -> Self {
        Self { db }
    }

    /// The device with `device_id`, if it exists, together with whether
    /// `user_id` owns it.
    async fn lookup(&self, user_id: i64, device_id: i64) -> ServiceResult<(Device, bool)> {
        let device = self
            .db
            .get_device(device_id)
            .await
            .map_err(|e| ServiceError::from_lookup(e, ServiceError::DeviceNotFound))?;
        let owned = device.owner_id == user_id;
        Ok((device, owned))
    }

    pub async fn list(&self, user_id: i64) -> ServiceResult<Vec<Device>> {
        Ok(self.db.list_devices(user_id).await?)
    }

    /// A device owned by `user_id`. Other users' devices read as missing.
    pub async fn get(&self, user_id: i64, device_id: i64) -> ServiceResult<Device> {
        match self.lookup(user_id, device_id).await? {
            (device, true) => Ok(device),
            (_, false) => Err(ServiceError::DeviceNotFound),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, device_id: i64) -> ServiceResult<()> {
        let (_, owned) = self.lookup(user_id, device_id).await?;
        if !owned {
            return Err(ServiceError::NotAuthorized);
        }
        if !self.db.delete_device(device_id).await? {
            return Err(ServiceError::DeviceNotFound);
        }
        info!("Device deleted");
        Ok(())
    }

    pub async fn telemetry(
        &self,
        user_id: i64,
        device_id: i64,
        query: TelemetryQuery,
    ) -> ServiceResult<Vec<TelemetrySample>> {
        let page = query.page()?;
        let (_, owned) = self.lookup(user_id, device_id).await?;
        if !owned {
            return Err(ServiceError::NotAuthorized);
        }
        Ok(self.db.list_telemetry(device_id, page).await?)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::Map;

    use super::*;
    use crate::storage::NewTelemetry;

    async fn setup() -> (DeviceService, ServerDatabase, i64, i64) {
        let db = ServerDatabase::open_in_memory().await.unwrap();
        let alice = db.create_user("a", "a@example.com", "h", "d").await.unwrap().id;
        let bob = db.create_user("b", "b@example.com", "h", "d").await.unwrap().id;
        (DeviceService::new(db.clone()), db, alice, bob)
    }

    fn sample(ts: &str) -> NewTelemetry {
        NewTelemetry {
            ts: DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc),
            cpu: Map::new(),
            memory: Map::new(),
            disk: Map::new(),
            sensors: Map::new(),
            network: Map::new(),
        }
    }

    #[test]
    fn query_defaults_and_bounds() {
        let page = TelemetryQuery::default().page().unwrap();
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset, 0);
        assert_eq!(page.order, TelemetryOrder::Old);

        let zero = TelemetryQuery {
            limit: Some(0),
            ..TelemetryQuery::default()
        };
        assert!(matches!(zero.page(), Err(ServiceError::Validation(_))));

        let negative = TelemetryQuery {
            offset: Some(-1),
            ..TelemetryQuery::default()
        };
        assert!(matches!(negative.page(), Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn other_users_devices_are_invisible() {
        let (svc, db, alice, bob) = setup().await;
        let device = db.create_device(alice, "ipc", "tok").await.unwrap();

        assert_eq!(svc.get(alice, device.id).await.unwrap().id, device.id);
        assert!(matches!(
            svc.get(bob, device.id).await,
            Err(ServiceError::DeviceNotFound)
        ));
        assert!(svc.list(bob).await.unwrap().is_empty());
        assert!(matches!(
            svc.telemetry(bob, device.id, TelemetryQuery::default()).await,
            Err(ServiceError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn only_the_owner_deletes() {
        let (svc, db, alice, bob) = setup().await;
        let device = db.create_device(alice, "ipc", "tok").await.unwrap();

        assert!(matches!(
            svc.delete(bob, device.id).await,
            Err(ServiceError::NotAuthorized)
        ));
        svc.delete(alice, device.id).await.unwrap();
        assert!(matches!(
            svc.delete(alice, device.id).await,
            Err(ServiceError::DeviceNotFound)
        ));
    }

    #[tokio::test]
    async fn telemetry_window_follows_the_requested_order() {
        let (svc, db, alice, _) = setup().await;
        let device = db.create_device(alice, "ipc", "tok").await.unwrap();
        for ts in [
            "2026-01-01T00:00:02Z",
            "2026-01-01T00:00:01Z",
            "2026-01-01T00:00:03Z",
        ] {
            db.insert_telemetry(device.id, &sample(ts)).await.unwrap();
        }
        let second = |s: &TelemetrySample| s.ts.format("%S").to_string();

        let newest_first = svc
            .telemetry(
                alice,
                device.id,
                TelemetryQuery {
                    order: Some(TelemetryOrder::New),
                    ..TelemetryQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            newest_first.iter().map(second).collect::<Vec<_>>(),
            ["03", "02", "01"]
        );

        let middle = svc
            .telemetry(
                alice,
                device.id,
                TelemetryQuery {
                    limit: Some(1),
                    offset: Some(1),
                    order: Some(TelemetryOrder::Old),
                },
            )
            .await
            .unwrap();
        assert_eq!(middle.iter().map(second).collect::<Vec<_>>(), ["02"]);
    }

    #[tokio::test]
    async fn telemetry_for_missing_device_is_not_found() {
        let (svc, _, alice, _) = setup().await;
        assert!(matches!(
            svc.telemetry(alice, 999, TelemetryQuery::default()).await,
            Err(ServiceError::DeviceNotFound)
        ));
    }
}
