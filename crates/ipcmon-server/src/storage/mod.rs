//! `SQLite` storage for the ipcmon server.
//!
//! Provides persistence for users, devices, telemetry samples and uploaded
//! file records.

mod db;
mod models;
mod queries;
mod queries_files;
mod queries_telemetry;


pub use db::{DatabaseError, ServerDatabase};
pub use models::*;
