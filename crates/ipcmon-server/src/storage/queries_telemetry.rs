//! Telemetry ledger queries.

use serde_json::{Map, Value};

use super::db::{DatabaseError, ServerDatabase};
use super::models::{NewTelemetry, TelemetryOrder, TelemetryPage, TelemetryRow, TelemetrySample};

fn encode_group(group: &Map<String, Value>) -> Result<String, DatabaseError> {
    serde_json::to_string(group).map_err(|e| DatabaseError::Query(e.to_string()))
}

impl ServerDatabase {
    /// Append one sample. Returns the new row id.
    pub async fn insert_telemetry(
        &self,
        device_id: i64,
        sample: &NewTelemetry,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO telemetry (device_id, ts, cpu, memory, disk, sensors, network)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(sample.ts.timestamp_micros())
        .bind(encode_group(&sample.cpu)?)
        .bind(encode_group(&sample.memory)?)
        .bind(encode_group(&sample.disk)?)
        .bind(encode_group(&sample.sensors)?)
        .bind(encode_group(&sample.network)?)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Fetch a window of a device's samples ordered by `(ts, id)`.
    pub async fn list_telemetry(
        &self,
        device_id: i64,
        page: TelemetryPage,
    ) -> Result<Vec<TelemetrySample>, DatabaseError> {
        let sql = match page.order {
            TelemetryOrder::Old => {
                "SELECT * FROM telemetry WHERE device_id = ? ORDER BY ts ASC, id ASC LIMIT ? OFFSET ?"
            }
            TelemetryOrder::New => {
                "SELECT * FROM telemetry WHERE device_id = ? ORDER BY ts DESC, id DESC LIMIT ? OFFSET ?"
            }
        };

        sqlx::query_as::<_, TelemetryRow>(sql)
            .bind(device_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(TelemetryRow::into_sample)
            .collect()
    }

    /// Number of samples stored for a device.
    pub async fn count_telemetry(&self, device_id: i64) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM telemetry WHERE device_id = ?")
            .bind(device_id)
            .fetch_one(self.pool())
            .await?;

        Ok(count)
    }
}
