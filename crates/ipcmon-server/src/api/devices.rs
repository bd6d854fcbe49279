//! `/v1/devices` and `/v1/telemetry` routes.

use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::AppState;
use super::extract::CurrentUser;
use super::response::{Envelope, data};
use crate::devices::TelemetryQuery;
use crate::error::{ServiceError, ServiceResult};
use crate::provisioning::{Inbound, ServerMessage, SessionTransport, TelemetrySession, TransportClosed};
use crate::storage::{Device, TelemetrySample};

pub fn devices_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_devices).post(add_device))
        .route("/token", post(issue_token))
        .route("/{id}", get(get_device).delete(delete_device))
}

pub fn telemetry_router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(stream))
        .route("/{device_id}", get(telemetry))
}

// =========================================================================
// Devices
// =========================================================================

#[derive(Debug, Deserialize)]
struct TokenRequest {
    name: String,
}

#[derive(Debug, Serialize)]
struct TokenIssued {
    status: &'static str,
    token: String,
}

async fn issue_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> ServiceResult<Json<TokenIssued>> {
    let Json(request) = payload?;
    let token = state.provisioning.get_token(&request.name).await?;
    Ok(Json(TokenIssued {
        status: "success",
        token,
    }))
}

#[derive(Debug, Deserialize)]
struct AddDevice {
    token: String,
}

async fn add_device(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<AddDevice>, JsonRejection>,
) -> ServiceResult<(StatusCode, Json<Envelope<Device>>)> {
    let Json(request) = payload?;
    let device = state
        .provisioning
        .add_device(user.user_id, &request.token)
        .await?;
    Ok((StatusCode::CREATED, data(device)))
}

async fn list_devices(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ServiceResult<Json<Envelope<Vec<Device>>>> {
    Ok(data(state.devices.list(user.user_id).await?))
}

async fn get_device(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ServiceResult<Json<Envelope<Device>>> {
    Ok(data(state.devices.get(user.user_id, id).await?))
}

async fn delete_device(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ServiceResult<StatusCode> {
    state.devices.delete(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// Telemetry
// =========================================================================

async fn telemetry(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(device_id): Path<i64>,
    query: Result<Query<TelemetryQuery>, QueryRejection>,
) -> ServiceResult<Json<Envelope<Vec<TelemetrySample>>>> {
    let Query(query) = query?;
    Ok(data(
        state.devices.telemetry(user.user_id, device_id, query).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    token: String,
}

/// Upgrade to a telemetry session. The token is checked after the upgrade
/// so a rejection carries a close code and reason.
async fn stream(
    State(state): State<AppState>,
    params: Result<Query<StreamParams>, QueryRejection>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServiceError> {
    let Query(params) = params?;
    Ok(ws.on_upgrade(move |socket| async move {
        let transport = WsTransport { socket };
        let mut session = TelemetrySession::new(
            params.token,
            transport,
            state.provisioning.clone(),
            state.db.clone(),
            state.clock.clone(),
        );
        let outcome = session.run().await;
        info!(?outcome, frames = session.frames(), "Telemetry session ended");
    }))
}

/// [`SessionTransport`] over an axum WebSocket.
struct WsTransport {
    socket: WebSocket,
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn send(&mut self, message: &ServerMessage) -> Result<(), TransportClosed> {
        let text = serde_json::to_string(message).map_err(|_| TransportClosed)?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| TransportClosed)
    }

    async fn recv(&mut self) -> Inbound {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Inbound::Text(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => return Inbound::Binary(bytes.to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Inbound::Closed,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive failed");
                    return Inbound::Closed;
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.socket.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}
