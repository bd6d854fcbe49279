//! Wire messages of the telemetry streaming session.
//!
//! Every message is a JSON object tagged by `type`. The server sends
//! `telemetry` (ready), `reconnect` (waiting for approval) and `ack`; the
//! device sends `telemetry` frames carrying a payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::NewTelemetry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// The session is bound and frames may be sent.
    Telemetry { ts: String },
    /// The claim has not been approved yet; stay connected.
    Reconnect { ts: String },
    /// A frame was persisted. `ts` echoes the frame's own timestamp.
    Ack { ts: String },
}

impl ServerMessage {
    pub fn ready() -> Self {
        Self::Telemetry { ts: now_rfc3339() }
    }

    pub fn reconnect() -> Self {
        Self::Reconnect { ts: now_rfc3339() }
    }

    pub const fn ack(ts: String) -> Self {
        Self::Ack { ts }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Telemetry { payload: TelemetryPayload },
}

#[derive(Debug, Clone, Deserialize)]
struct TelemetryPayload {
    ts: String,
    cpu: Map<String, Value>,
    memory: Map<String, Value>,
    disk: Map<String, Value>,
    sensors: Map<String, Value>,
    network: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedFrame {
    /// Timestamp exactly as the device sent it, for the ack.
    pub ts: String,
    pub sample: NewTelemetry,
}

/// Parse and validate one text frame from a device.
pub fn parse_frame(text: &str) -> Result<AcceptedFrame, FrameError> {
    let ClientMessage::Telemetry { payload } = serde_json::from_str(text)?;
    let ts = DateTime::parse_from_rfc3339(&payload.ts)
        .map_err(|_| FrameError::Timestamp(payload.ts.clone()))?
        .with_timezone(&Utc);

    Ok(AcceptedFrame {
        sample: NewTelemetry {
            ts,
            cpu: payload.cpu,
            memory: payload.memory,
            disk: payload.disk,
            sensors: payload.sensors,
            network: payload.network,
        },
        ts: payload.ts,
    })
}
