//! ipcmon Server Library
//!
//! Core functionality for the ipcmon server:
//! - SQLite storage for users, devices, telemetry and file records
//! - Cookie sessions, password hashing and reset tokens
//! - Email confirmation workflow and the outbound mail queue
//! - Device provisioning and the telemetry WebSocket session
//! - Object-store backed file proxy
//! - HTTP routes under `/v1`

pub mod api;
pub mod auth;
pub mod confirmation;
pub mod devices;
pub mod error;
pub mod files;
pub mod mail;
pub mod provisioning;
pub mod storage;
pub mod users;
pub mod validate;
