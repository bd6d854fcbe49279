//! ipcmon Core Library
//!
//! Shared functionality for ipcmon components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Expiring namespaced key-value cache
//! - Injectable monotonic clock
//! - Common error types

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use cache::{Cache, CacheError};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::Config;
pub use error::{Error, Result};
