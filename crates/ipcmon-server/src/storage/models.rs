//! Data models for ipcmon storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::db::DatabaseError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub avatar: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified: bool,
    pub registered_at: i64,
}

/// Single-column user updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserPatch {
    EmailVerified(bool),
    Avatar(String),
    PasswordHash(String),
}

/// Multi-column profile edit. `None` leaves the column untouched. Changing
/// the email clears `email_verified`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub token: String,
    pub status: DeviceStatus,
    pub created_at: i64,
    pub last_seen_at: Option<i64>,
}

/// Single-column device updates issued by the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePatch {
    Status(DeviceStatus),
    LastSeen(i64),
}

/// A telemetry frame ready to be appended to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTelemetry {
    pub ts: DateTime<Utc>,
    pub cpu: Map<String, Value>,
    pub memory: Map<String, Value>,
    pub disk: Map<String, Value>,
    pub sensors: Map<String, Value>,
    pub network: Map<String, Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct TelemetryRow {
    pub id: i64,
    pub device_id: i64,
    pub ts: i64,
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub sensors: String,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetrySample {
    pub id: i64,
    pub device_id: i64,
    pub ts: DateTime<Utc>,
    pub cpu: Map<String, Value>,
    pub memory: Map<String, Value>,
    pub disk: Map<String, Value>,
    pub sensors: Map<String, Value>,
    pub network: Map<String, Value>,
}

impl TelemetryRow {
    pub(super) fn into_sample(self) -> Result<TelemetrySample, DatabaseError> {
        let row = self;
        let group = |raw: &str| {
            serde_json::from_str::<Map<String, Value>>(raw)
                .map_err(|e| DatabaseError::Query(format!("telemetry {}: {e}", row.id)))
        };
        let ts = DateTime::<Utc>::from_timestamp_micros(row.ts)
            .ok_or_else(|| DatabaseError::Query(format!("telemetry {}: bad ts", row.id)))?;
        Ok(TelemetrySample {
            id: row.id,
            device_id: row.device_id,
            ts,
            cpu: group(&row.cpu)?,
            memory: group(&row.memory)?,
            disk: group(&row.disk)?,
            sensors: group(&row.sensors)?,
            network: group(&row.network)?,
        })
    }
}

/// Retrieval direction for telemetry, always tie-broken by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryOrder {
    /// Oldest first.
    #[default]
    Old,
    /// Newest first.
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryPage {
    pub limit: i64,
    pub offset: i64,
    pub order: TelemetryOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub key: String,
    pub origin: String,
    pub size: i64,
    pub author_id: i64,
    pub created_at: i64,
}
