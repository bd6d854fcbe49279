//! Telemetry streaming session.
//!
//! A session is opened with a token. It resolves the token to a device,
//! optionally waits for the claim to be approved, then ingests frames
//! until the peer goes away or violates the protocol:
//!
//! ```text
//! Resolving ──► Bound ──► Streaming ◄─┐
//!     │           ▲          │  └─────┘ one accepted frame
//!     │           │          ▼
//!     ├──► WaitingApproval   Closed
//!     │           │
//!     ▼           ▼
//!  Rejected    TimedOut
//! ```
//!
//! The transport and the clock are injected so the whole machine can be
//! driven without a socket or real time passing.

use std::sync::Arc;

use async_trait::async_trait;
use ipcmon_core::Clock;
use ipcmon_core::db::unix_timestamp;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::claim::ProvisioningService;
use super::frames::{ServerMessage, parse_frame};
use crate::storage::{Device, DevicePatch, DeviceStatus, ServerDatabase};

/// WebSocket close code for policy violations.
pub const POLICY_VIOLATION: u16 = 1008;

pub const REASON_INVALID_TOKEN: &str = "Invalid token";
pub const REASON_TIMEOUT: &str = "Provision timeout";
pub const REASON_PROTOCOL: &str = "Protocol error";

/// The peer is gone; nothing more can be sent.
#[derive(Debug, thiserror::Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// One inbound event from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

/// Bidirectional message channel to a device.
#[async_trait]
pub trait SessionTransport: Send {
    async fn send(&mut self, message: &ServerMessage) -> Result<(), TransportClosed>;

    /// Next inbound event. Control frames are handled by the transport.
    async fn recv(&mut self) -> Inbound;

    async fn close(&mut self, code: u16, reason: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Disconnected,
    ProtocolError,
}

#[derive(Debug)]
enum SessionState {
    Resolving,
    WaitingApproval { since: Instant },
    Bound(Device),
    Streaming(Device),
    Rejected,
    TimedOut,
    Closed {
        device_id: Option<i64>,
        reason: CloseReason,
    },
}

impl SessionState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::WaitingApproval { .. } => "waiting_approval",
            Self::Bound(_) => "bound",
            Self::Streaming(_) => "streaming",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
            Self::Closed { .. } => "closed",
        }
    }

    const fn protocol_error(device_id: Option<i64>) -> Self {
        Self::Closed {
            device_id,
            reason: CloseReason::ProtocolError,
        }
    }

    const fn disconnected(device_id: Option<i64>) -> Self {
        Self::Closed {
            device_id,
            reason: CloseReason::Disconnected,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The token is neither a device nor a pending claim.
    Rejected,
    /// The claim was not approved in time.
    TimedOut,
    /// The peer went away. Not an error.
    Disconnected,
    /// The peer sent something invalid or persistence failed.
    ProtocolError,
}

pub struct TelemetrySession<T> {
    token: String,
    transport: T,
    provisioning: ProvisioningService,
    db: ServerDatabase,
    clock: Arc<dyn Clock>,
    frames: u64,
}

impl<T: SessionTransport> TelemetrySession<T> {
    pub fn new(
        token: impl Into<String>,
        transport: T,
        provisioning: ProvisioningService,
        db: ServerDatabase,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token: token.into(),
            transport,
            provisioning,
            db,
            clock,
            frames: 0,
        }
    }

    /// Number of frames persisted so far.
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Drive the session to completion.
    pub async fn run(&mut self) -> SessionOutcome {
        let mut state = SessionState::Resolving;
        loop {
            debug!(state = state.name(), "Session state");
            state = match state {
                SessionState::Resolving => self.resolve().await,
                SessionState::WaitingApproval { since } => self.poll_approval(since).await,
                SessionState::Bound(device) => self.bind(device).await,
                SessionState::Streaming(device) => self.next_frame(device).await,
                SessionState::Rejected => {
                    info!("Session rejected: unknown token");
                    self.transport
                        .close(POLICY_VIOLATION, REASON_INVALID_TOKEN)
                        .await;
                    return SessionOutcome::Rejected;
                }
                SessionState::TimedOut => {
                    info!("Session timed out waiting for approval");
                    self.transport.close(POLICY_VIOLATION, REASON_TIMEOUT).await;
                    return SessionOutcome::TimedOut;
                }
                SessionState::Closed { device_id, reason } => {
                    return self.finish(device_id, reason).await;
                }
            };
        }
    }

    async fn resolve(&mut self) -> SessionState {
        match self.provisioning.find_device(&self.token).await {
            Ok(Some(device)) => SessionState::Bound(device),
            Ok(None) if self.provisioning.is_pending(&self.token).await => {
                SessionState::WaitingApproval {
                    since: self.clock.now(),
                }
            }
            Ok(None) => SessionState::Rejected,
            Err(e) => {
                warn!(error = %e, "Failed to resolve session token");
                SessionState::protocol_error(None)
            }
        }
    }

    /// One poll tick: notify the peer, re-resolve, then either give up or
    /// sleep until the next tick.
    async fn poll_approval(&mut self, since: Instant) -> SessionState {
        if self.transport.send(&ServerMessage::reconnect()).await.is_err() {
            return SessionState::disconnected(None);
        }

        match self.provisioning.find_device(&self.token).await {
            Ok(Some(device)) => return SessionState::Bound(device),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Failed to resolve session token");
                return SessionState::protocol_error(None);
            }
        }

        let settings = self.provisioning.settings();
        if self.clock.elapsed_since(since) >= settings.reconnect_timeout() {
            return SessionState::TimedOut;
        }
        self.clock.sleep(settings.reconnect_interval()).await;
        SessionState::WaitingApproval { since }
    }

    async fn bind(&mut self, device: Device) -> SessionState {
        let patch = DevicePatch::Status(DeviceStatus::Online);
        if let Err(e) = self.db.patch_device(device.id, patch).await {
            warn!(device_id = device.id, error = %e, "Failed to mark device online");
            return SessionState::protocol_error(None);
        }
        info!(device_id = device.id, "Device session bound");

        if self.transport.send(&ServerMessage::ready()).await.is_err() {
            return SessionState::disconnected(Some(device.id));
        }
        SessionState::Streaming(device)
    }

    async fn next_frame(&mut self, device: Device) -> SessionState {
        let text = match self.transport.recv().await {
            Inbound::Text(text) => text,
            Inbound::Binary(_) => {
                debug!(device_id = device.id, "Binary frame rejected");
                return SessionState::protocol_error(Some(device.id));
            }
            Inbound::Closed => return SessionState::disconnected(Some(device.id)),
        };

        let frame = match parse_frame(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(device_id = device.id, error = %e, "Invalid frame");
                return SessionState::protocol_error(Some(device.id));
            }
        };

        if let Err(e) = self.db.insert_telemetry(device.id, &frame.sample).await {
            warn!(device_id = device.id, error = %e, "Failed to store telemetry");
            return SessionState::protocol_error(Some(device.id));
        }
        let seen = DevicePatch::LastSeen(unix_timestamp());
        if let Err(e) = self.db.patch_device(device.id, seen).await {
            warn!(device_id = device.id, error = %e, "Failed to update last seen");
            return SessionState::protocol_error(Some(device.id));
        }
        self.frames += 1;

        if self.transport.send(&ServerMessage::ack(frame.ts)).await.is_err() {
            return SessionState::disconnected(Some(device.id));
        }
        SessionState::Streaming(device)
    }

    async fn finish(&mut self, device_id: Option<i64>, reason: CloseReason) -> SessionOutcome {
        if let Some(device_id) = device_id {
            let patch = DevicePatch::Status(DeviceStatus::Offline);
            if let Err(e) = self.db.patch_device(device_id, patch).await {
                warn!(device_id, error = %e, "Failed to mark device offline");
            }
            info!(device_id, frames = self.frames, ?reason, "Device session closed");
        }

        match reason {
            CloseReason::Disconnected => SessionOutcome::Disconnected,
            CloseReason::ProtocolError => {
                self.transport.close(POLICY_VIOLATION, REASON_PROTOCOL).await;
                SessionOutcome::ProtocolError
            }
        }
    }
}
